use anyhow::{Context, Result};
use aws_sdk_sqs::{
    types::{DeleteMessageBatchRequestEntry, Message},
    Client,
};
use core::time::Duration;
use face_event_handler::{app, client};
use std::env::var;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The minimum time to wait between ticks, in milliseconds.
const BASE_LAPSE_TIME: u64 = 300;

/// The base of the exponential backoff sequence.
const BACKOFF_BASE: u64 = 2;

/// The maximum amount of milliseconds to sleep between ticks. Set to
/// the equivalent of 20 minutes.
const MAX_SLEEP: u64 = 1200000;

/// Wrapper structure that executes successive SQS consumption cycles:
/// receive messages, parse the S3 events they carry, run the face
/// pipeline for each, and finally delete the messages that were
/// handled.
struct SQSConsumer {
    queue_url: String,
    visibility_timeout: i32,
    max_number_of_messages: i32,
    client: Client,
    backoff: u32,
}

/// Whether a message is done with and may be deleted. Messages whose
/// upload failed are left for redelivery.
async fn handle_message(message: &Message) -> bool {
    let Some(body) = message.body() else {
        warn!("SQS message {:?} has no body", message.message_id());
        return true;
    };
    app::current().handle_message_body(body).await
}

impl SQSConsumer {
    /// Record a success and wait a little while.
    async fn pass(&mut self) {
        self.backoff = 0;
        sleep(Duration::from_millis(BASE_LAPSE_TIME)).await;
    }

    /// Record a failure and wait a while.
    async fn fail(&mut self) {
        sleep(Duration::from_millis(std::cmp::min(
            BASE_LAPSE_TIME.saturating_mul(BACKOFF_BASE.saturating_pow(self.backoff)),
            MAX_SLEEP,
        )))
        .await;
        self.backoff = self.backoff.saturating_add(1);
    }

    /// Perform a single pass of the SQS consumption cycle.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) {
        let result = match self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(self.visibility_timeout)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(20)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Error while consuming messages from SQS queue: {:?}", e);
                return self.fail().await;
            }
        };

        let messages = result.messages();
        let mut done = Vec::with_capacity(messages.len());
        for message in messages {
            if handle_message(message).await {
                done.push(message);
            }
        }
        if done.len() < messages.len() {
            warn!(
                "{} SQS messages weren't handled and won't be deleted",
                messages.len() - done.len()
            );
        }
        if done.is_empty() {
            return self.pass().await;
        }

        info!("Deleting {} SQS messages", done.len());
        let entries = done
            .iter()
            .enumerate()
            .map(|(index, message)| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(message
                        .message_id()
                        .map(String::from)
                        .unwrap_or_else(|| index.to_string()))
                    .set_receipt_handle(message.receipt_handle().map(String::from))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>();
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Couldn't prepare the deletion of SQS messages: {:?}", e);
                return self.fail().await;
            }
        };
        let result = match self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Couldn't delete SQS messages: {:?}", e);
                return self.fail().await;
            }
        };
        if !result.failed().is_empty() {
            warn!(
                "Couldn't delete some SQS messages: {:?} out of {:?} weren't deleted",
                result.failed().len(),
                done.len()
            );
        }
        self.pass().await;
    }
}

/// Consume S3 upload events from an SQS queue, running the face
/// pipeline for each of them.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init().await?;

    let queue_url = var("SQS_QUEUE_URL").context("SQS_QUEUE_URL is required")?;
    let visibility_timeout = var("SQS_VISIBILITY_TIMEOUT")
        .unwrap_or(String::from("30"))
        .parse::<i32>()
        .context("SQS_VISIBILITY_TIMEOUT must be a number")?;
    let max_number_of_messages = var("SQS_MAX_NUMBER_OF_MESSAGES")
        .unwrap_or(String::from("1"))
        .parse::<i32>()
        .context("SQS_MAX_NUMBER_OF_MESSAGES must be a number")?;
    let sqs_client = Client::new(&client::sdk_config().await);

    let mut consumer = SQSConsumer {
        queue_url,
        visibility_timeout,
        max_number_of_messages,
        client: sqs_client,
        backoff: 0,
    };

    // Listen for abort signals
    let (stop_processing, mut should_stop) = tokio::sync::oneshot::channel();
    tokio::spawn(async {
        let stopped = tokio::signal::ctrl_c()
            .await
            .map_err(|e| e.to_string())
            .and_then(|_| {
                info!("CTRL-C");
                stop_processing
                    .send(())
                    .map_err(|_| String::from("the consumer loop is already gone"))
            });
        if let Err(e) = stopped {
            warn!("Couldn't stop the consumer: {}", e);
        }
    });

    // Continuously receive messages and run the pipeline for each
    loop {
        tokio::select! {
            _ = consumer.tick() => (),
            _ = &mut should_stop => break
        }
    }
    Ok(())
}
