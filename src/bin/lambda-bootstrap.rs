use anyhow::{anyhow, Result};
use aws_lambda_events::event::s3::S3Event;
use face_event_handler::app;
use face_event_handler::outcome::Response;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

/// Run the face pipeline for the first record of the S3 event.
async fn function_handler(event: LambdaEvent<S3Event>) -> Result<Response, Error> {
    Ok(app::current().handle_event(&event.payload).await)
}

/// Run an AWS Lambda function that listens to S3 upload events,
/// detects and matches the face in each uploaded image, stores the
/// outcome and publishes a notification about it.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init().await?;

    run(service_fn(function_handler))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}
