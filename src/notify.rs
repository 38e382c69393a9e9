//! Defines the notifications sent for each upload, and the SNS
//! notifier that publishes them.

use crate::event::UploadEvent;
use crate::model::{FaceAttributes, MetadataRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sns::Client;
use rust_decimal::Decimal;
use tracing::instrument;

/// A message for the operators' topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Delivers notifications. Delivery is not confirmed beyond the
/// publish call itself.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, message: &Notification) -> Result<()>;
}

/// Render a score with two decimals, e.g. `95.12`.
fn percent(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Describe the face attributes, one per line.
fn describe_face(attributes: &FaceAttributes) -> String {
    let mut text = format!(
        "Age range: {}-{}\nGender: {} ({}% confidence)",
        attributes.age_range.low,
        attributes.age_range.high,
        attributes.gender.value,
        percent(attributes.gender.confidence)
    );
    if !attributes.emotions.is_empty() {
        text.push_str("\nEmotions:");
        for emotion in &attributes.emotions {
            text.push_str(&format!(
                "\n  {} ({}%)",
                emotion.kind,
                percent(emotion.confidence)
            ));
        }
    }
    text
}

/// Sent when the image shows no face at all.
pub fn no_face(event: &UploadEvent) -> Notification {
    Notification {
        subject: String::from("No Face Detected"),
        body: format!(
            "No face was detected in image {} from bucket {}.\n\
             Access denied.",
            event.key, event.bucket
        ),
    }
}

/// Sent when the face matched an employee.
pub fn authorized(record: &MetadataRecord) -> Notification {
    let attributes = &record.attributes;
    Notification {
        subject: String::from("Authorized Access"),
        body: format!(
            "Face recognized in image {} from bucket {}.\n\
             Employee ID: {}\n\
             Confidence: {}%\n\
             Age range: {}-{}\n\
             Gender: {} ({}% confidence)\n\
             Entry is authorized.",
            record.image_key,
            record.bucket,
            record.matched_employee,
            percent(record.match_confidence),
            attributes.age_range.low,
            attributes.age_range.high,
            attributes.gender.value,
            percent(attributes.gender.confidence)
        ),
    }
}

/// Sent when the face matched nobody in the collection.
pub fn unauthorized(record: &MetadataRecord, collection: &str) -> Notification {
    Notification {
        subject: String::from("Unauthorized Access Attempt"),
        body: format!(
            "Unrecognized face in image {} from bucket {}.\n\
             No match found in collection {}.\n\
             {}\n\
             Access is denied. Alert security.",
            record.image_key,
            record.bucket,
            collection,
            describe_face(&record.attributes)
        ),
    }
}

/// Sent when processing the upload failed.
pub fn failure(bucket: &str, key: &str, error: &str) -> Notification {
    Notification {
        subject: String::from("Face Recognition Error"),
        body: format!(
            "Failed to process image {} from bucket {}.\n\
             Error: {}",
            key, bucket, error
        ),
    }
}

/// Publishes notifications to an SNS topic.
pub struct SnsNotifier {
    client: Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: Client, topic_arn: impl Into<String>) -> Self {
        SnsNotifier {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    #[instrument(skip(self, message), fields(topic = %self.topic_arn, subject = %message.subject))]
    async fn publish(&self, message: &Notification) -> Result<()> {
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(&message.subject)
            .message(&message.body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to publish {:?} notification to topic {:?}",
                    message.subject, self.topic_arn
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgeRange, Emotion, Gender, MatchResult};
    use aws_sdk_sns::operation::publish::PublishOutput;
    use aws_smithy_mocks::{mock, mock_client};
    use chrono::Utc;

    fn record(result: MatchResult) -> MetadataRecord {
        MetadataRecord::new(
            &UploadEvent::new("uploads", "img1.jpg"),
            FaceAttributes {
                age_range: AgeRange { low: 25, high: 35 },
                gender: Gender {
                    value: String::from("Female"),
                    confidence: "98".parse().unwrap(),
                },
                emotions: vec![
                    Emotion {
                        kind: String::from("CALM"),
                        confidence: "88.456".parse().unwrap(),
                    },
                    Emotion {
                        kind: String::from("FEAR"),
                        confidence: "3.2".parse().unwrap(),
                    },
                ],
            },
            result,
            Utc::now(),
        )
    }

    #[test]
    fn authorized_message() {
        let message = authorized(&record(MatchResult {
            matched: true,
            employee_id: String::from("alice"),
            confidence: "95.123".parse().unwrap(),
        }));
        assert_eq!(message.subject, "Authorized Access");
        assert_eq!(
            message.body,
            "Face recognized in image img1.jpg from bucket uploads.\n\
             Employee ID: alice\n\
             Confidence: 95.12%\n\
             Age range: 25-35\n\
             Gender: Female (98.00% confidence)\n\
             Entry is authorized."
        );
    }

    #[test]
    fn unauthorized_message() {
        let message = unauthorized(&record(MatchResult::from_candidates(vec![])), "employeeFaces");
        assert_eq!(message.subject, "Unauthorized Access Attempt");
        assert_eq!(
            message.body,
            "Unrecognized face in image img1.jpg from bucket uploads.\n\
             No match found in collection employeeFaces.\n\
             Age range: 25-35\n\
             Gender: Female (98.00% confidence)\n\
             Emotions:\n  CALM (88.46%)\n  FEAR (3.20%)\n\
             Access is denied. Alert security."
        );
    }

    #[test]
    fn no_face_and_failure_messages() {
        let message = no_face(&UploadEvent::new("uploads", "blank.jpg"));
        assert_eq!(message.subject, "No Face Detected");
        assert!(message.body.contains("blank.jpg"));
        assert!(message.body.contains("Access denied."));

        let message = failure("uploads", "unknown", "boom");
        assert_eq!(message.subject, "Face Recognition Error");
        assert!(message.body.contains("uploads"));
        assert!(message.body.ends_with("Error: boom"));
    }

    #[tokio::test]
    async fn publishes_to_the_configured_topic() {
        let topic = "arn:aws:sns:us-east-2:000000000000:FaceDetectedTopic";
        let rule = mock!(Client::publish)
            .match_requests(move |req| {
                req.topic_arn() == Some(topic) && req.subject() == Some("No Face Detected")
            })
            .then_output(|| PublishOutput::builder().message_id("m-1").build());
        let client = mock_client!(aws_sdk_sns, [&rule]);
        let notifier = SnsNotifier::new(client, topic);

        notifier
            .publish(&no_face(&UploadEvent::new("uploads", "blank.jpg")))
            .await
            .unwrap();

        assert_eq!(rule.num_calls(), 1);
    }
}
