//! Defines configuration as read from the environment.

use serde::Deserialize;
use tracing::warn;

/// Fallback `dynamo_table` value.
pub const DEFAULT_DYNAMO_TABLE: &str = "FaceMetadata";

/// Fallback `sns_topic_arn` value.
pub const DEFAULT_SNS_TOPIC_ARN: &str = "arn:aws:sns:us-east-2:094092120892:FaceDetectedTopic";

/// Fallback `rekognition_collection` value.
pub const DEFAULT_REKOGNITION_COLLECTION: &str = "employeeFaces";

/// The handler detects faces in uploaded images, matches them
/// against a face collection, stores the outcome and notifies a
/// topic. The configuration must be given as environment variables.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// The DynamoDB table receiving one metadata record per
    /// processed image.
    #[serde(default)]
    pub dynamo_table: Option<String>,

    /// The SNS topic receiving every notification.
    #[serde(default)]
    pub sns_topic_arn: Option<String>,

    /// The Rekognition collection holding the reference faces.
    #[serde(default)]
    pub rekognition_collection: Option<String>,

    /// Defines a filter to select only matching keys. The star (*)
    /// can be used as a wildcard matching any number of non-slash
    /// characters. E.g. to match any JPEG file in a folder, use
    /// `"folder/*.jpg"`. Omitting this will make it match any file.
    #[serde(default)]
    pub match_key: Option<String>,
}

impl Settings {
    /// The configured table name, or its fallback.
    pub fn dynamo_table(&self) -> &str {
        self.dynamo_table.as_deref().unwrap_or(DEFAULT_DYNAMO_TABLE)
    }

    /// The configured topic ARN, or its fallback.
    pub fn sns_topic_arn(&self) -> &str {
        self.sns_topic_arn.as_deref().unwrap_or(DEFAULT_SNS_TOPIC_ARN)
    }

    /// The configured collection id, or its fallback.
    pub fn rekognition_collection(&self) -> &str {
        self.rekognition_collection
            .as_deref()
            .unwrap_or(DEFAULT_REKOGNITION_COLLECTION)
    }

    /// Names of the environment variables that were absent and
    /// replaced by a hard-coded fallback.
    pub fn fallbacks(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.dynamo_table.is_none() {
            missing.push("DYNAMO_TABLE");
        }
        if self.sns_topic_arn.is_none() {
            missing.push("SNS_TOPIC_ARN");
        }
        if self.rekognition_collection.is_none() {
            missing.push("REKOGNITION_COLLECTION");
        }
        missing
    }

    /// Log every fallback in use.
    pub fn warn_fallbacks(&self) {
        for var in self.fallbacks() {
            warn!("{} is not set; using the built-in default", var);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_fall_back_to_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.dynamo_table(), "FaceMetadata");
        assert_eq!(settings.sns_topic_arn(), DEFAULT_SNS_TOPIC_ARN);
        assert_eq!(settings.rekognition_collection(), "employeeFaces");
        assert_eq!(
            settings.fallbacks(),
            vec!["DYNAMO_TABLE", "SNS_TOPIC_ARN", "REKOGNITION_COLLECTION"]
        );
    }

    #[test]
    fn reads_variables_from_an_environment() {
        let settings: Settings = envy::from_iter(vec![
            (String::from("DYNAMO_TABLE"), String::from("Faces")),
            (
                String::from("SNS_TOPIC_ARN"),
                String::from("arn:aws:sns:eu-west-1:000000000000:Alerts"),
            ),
            (String::from("MATCH_KEY"), String::from("uploads/*.jpg")),
        ])
        .unwrap();
        assert_eq!(settings.dynamo_table(), "Faces");
        assert_eq!(
            settings.sns_topic_arn(),
            "arn:aws:sns:eu-west-1:000000000000:Alerts"
        );
        assert_eq!(settings.rekognition_collection(), "employeeFaces");
        assert_eq!(settings.match_key.as_deref(), Some("uploads/*.jpg"));
        assert_eq!(settings.fallbacks(), vec!["REKOGNITION_COLLECTION"]);
    }
}
