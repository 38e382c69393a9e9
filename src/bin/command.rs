use anyhow::{bail, Context, Result};
use face_event_handler::app;
use face_event_handler::event::UploadEvent;
use std::env::var;

/// Run the face pipeline once for the object named by the `BUCKET`
/// and `KEY` environment variables, and print the response.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init().await?;

    let bucket = var("BUCKET").context("BUCKET is required")?;
    let key = var("KEY").context("KEY is required")?;
    let event = UploadEvent::new(bucket, key);

    let response = app::current().handle(&event).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        bail!("Failed to handle upload {:?}", event);
    }
    Ok(())
}
