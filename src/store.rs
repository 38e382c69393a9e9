//! Defines the metadata store and its DynamoDB implementation.

use crate::model::{Emotion, MetadataRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::instrument;

/// Persists one record per processed image.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the record, or replace the one stored under the same
    /// face id.
    async fn put_record(&self, record: &MetadataRecord) -> Result<()>;
}

fn number(value: Decimal) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn string(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

fn emotion_item(emotion: &Emotion) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        (String::from("Type"), string(&emotion.kind)),
        (String::from("Confidence"), number(emotion.confidence)),
    ]))
}

/// Render a record as a DynamoDB item, with numbers kept in their
/// exact decimal form.
pub fn record_item(record: &MetadataRecord) -> HashMap<String, AttributeValue> {
    let attributes = &record.attributes;
    HashMap::from([
        (String::from("FaceId"), string(&record.face_id)),
        (String::from("ImageKey"), string(&record.image_key)),
        (String::from("Bucket"), string(&record.bucket)),
        (
            String::from("MatchStatus"),
            string(record.match_status.as_str()),
        ),
        (
            String::from("MatchedEmployee"),
            string(&record.matched_employee),
        ),
        (
            String::from("MatchConfidence"),
            number(record.match_confidence),
        ),
        (
            String::from("AgeRange"),
            AttributeValue::M(HashMap::from([
                (
                    String::from("Low"),
                    number(Decimal::from(attributes.age_range.low)),
                ),
                (
                    String::from("High"),
                    number(Decimal::from(attributes.age_range.high)),
                ),
            ])),
        ),
        (
            String::from("Gender"),
            AttributeValue::M(HashMap::from([
                (String::from("Value"), string(&attributes.gender.value)),
                (
                    String::from("Confidence"),
                    number(attributes.gender.confidence),
                ),
            ])),
        ),
        (
            String::from("Emotions"),
            AttributeValue::L(attributes.emotions.iter().map(emotion_item).collect()),
        ),
        (
            String::from("ProcessedAt"),
            string(&record.processed_at_rfc3339()),
        ),
    ])
}

/// Records stored as items of a DynamoDB table keyed by `FaceId`.
pub struct DynamoStore {
    client: Client,
    table: String,
}

impl DynamoStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        DynamoStore {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl Store for DynamoStore {
    #[instrument(skip(self, record), fields(table = %self.table, face_id = %record.face_id))]
    async fn put_record(&self, record: &MetadataRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_item(record)))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to store metadata for object {:?} in table {:?}",
                    record.face_id, self.table
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UploadEvent;
    use crate::model::{AgeRange, FaceAttributes, Gender, MatchResult, NO_MATCH};
    use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
    use aws_smithy_mocks::{mock, mock_client};
    use chrono::{TimeZone, Utc};

    fn record(result: MatchResult) -> MetadataRecord {
        MetadataRecord::new(
            &UploadEvent::new("uploads", "img1.jpg"),
            FaceAttributes {
                age_range: AgeRange { low: 25, high: 35 },
                gender: Gender {
                    value: String::from("Female"),
                    confidence: "98.12".parse().unwrap(),
                },
                emotions: vec![Emotion {
                    kind: String::from("HAPPY"),
                    confidence: "91.5".parse().unwrap(),
                }],
            },
            result,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    fn map_entry<'a>(item: &'a AttributeValue, name: &str) -> &'a AttributeValue {
        item.as_m().unwrap().get(name).unwrap()
    }

    #[test]
    fn matched_record_item() {
        let item = record_item(&record(MatchResult {
            matched: true,
            employee_id: String::from("alice"),
            confidence: "95".parse().unwrap(),
        }));
        assert_eq!(item["FaceId"], string("img1.jpg"));
        assert_eq!(item["ImageKey"], string("img1.jpg"));
        assert_eq!(item["Bucket"], string("uploads"));
        assert_eq!(item["MatchStatus"], string("MATCHED"));
        assert_eq!(item["MatchedEmployee"], string("alice"));
        assert_eq!(item["MatchConfidence"], AttributeValue::N(String::from("95")));
        assert_eq!(
            map_entry(&item["AgeRange"], "Low"),
            &AttributeValue::N(String::from("25"))
        );
        assert_eq!(
            map_entry(&item["AgeRange"], "High"),
            &AttributeValue::N(String::from("35"))
        );
        assert_eq!(map_entry(&item["Gender"], "Value"), &string("Female"));
        assert_eq!(
            map_entry(&item["Gender"], "Confidence"),
            &AttributeValue::N(String::from("98.12"))
        );
        let emotions = item["Emotions"].as_l().unwrap();
        assert_eq!(emotions.len(), 1);
        assert_eq!(map_entry(&emotions[0], "Type"), &string("HAPPY"));
        assert_eq!(
            map_entry(&emotions[0], "Confidence"),
            &AttributeValue::N(String::from("91.5"))
        );
        assert_eq!(item["ProcessedAt"], string("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn unmatched_record_item() {
        let item = record_item(&record(MatchResult::from_candidates(vec![])));
        assert_eq!(item["MatchStatus"], string("UNMATCHED"));
        assert_eq!(item["MatchedEmployee"], string(NO_MATCH));
        assert_eq!(item["MatchConfidence"], AttributeValue::N(String::from("0")));
    }

    #[tokio::test]
    async fn puts_the_item_into_the_configured_table() {
        let rule = mock!(Client::put_item)
            .match_requests(|req| req.table_name() == Some("FaceMetadata"))
            .then_output(|| PutItemOutput::builder().build());
        let client = mock_client!(aws_sdk_dynamodb, [&rule]);
        let store = DynamoStore::new(client, "FaceMetadata");

        store
            .put_record(&record(MatchResult::from_candidates(vec![])))
            .await
            .unwrap();

        assert_eq!(rule.num_calls(), 1);
    }
}
