//! Defines the AWS service clients shared by every invocation.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::env;

/// Load the shared AWS configuration, honoring an endpoint override
/// given through `AWS_ENDPOINT_URL`.
pub async fn sdk_config() -> SdkConfig {
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    if let Ok(endpoint_url) = endpoint_url_var {
        aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region(Region::new("us-east-1")) // should be OK since the endpoint was overridden
            .load()
            .await
    } else {
        aws_config::load_defaults(BehaviorVersion::latest()).await
    }
}

/// The clients for the three services the handler talks to.
#[derive(Clone, Debug)]
pub struct Clients {
    pub rekognition: aws_sdk_rekognition::Client,
    pub dynamodb: aws_sdk_dynamodb::Client,
    pub sns: aws_sdk_sns::Client,
}

impl Clients {
    /// Build every client from a single shared configuration.
    pub fn new(config: &SdkConfig) -> Self {
        Clients {
            rekognition: aws_sdk_rekognition::Client::new(config),
            dynamodb: aws_sdk_dynamodb::Client::new(config),
            sns: aws_sdk_sns::Client::new(config),
        }
    }
}
