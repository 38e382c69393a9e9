//! Defines the _upload event_, the input for one run of the face
//! pipeline. The upload event is built from the S3 event.

use anyhow::{anyhow, Result};
use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use tracing::{instrument, warn};

/// Placeholder for a bucket or key that couldn't be read from the
/// event.
pub const UNKNOWN: &str = "unknown";

/// The object whose upload triggered the invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadEvent {
    pub bucket: String,
    pub key: String,
}

impl UploadEvent {
    /// Build an upload event for a bucket and key.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        UploadEvent {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Builds the upload event from the first record inside an S3
    /// event. Any other record is ignored.
    #[instrument(skip(event), fields(records = event.records.len()))]
    pub fn from_s3_event(event: &S3Event) -> Result<Self> {
        let record = event
            .records
            .first()
            .ok_or_else(|| anyhow!("S3 event contains no records"))?;
        if event.records.len() > 1 {
            warn!(
                "S3 event contains {} records; only the first one is processed",
                event.records.len()
            );
        }
        Self::from_record(record)
    }

    /// Builds the upload event from a single S3 event record.
    pub fn from_record(record: &S3EventRecord) -> Result<Self> {
        let bucket = record
            .s3
            .bucket
            .name
            .as_ref()
            .ok_or_else(|| anyhow!("S3 event record has no bucket name"))?;
        let key = record
            .s3
            .object
            .key
            .as_ref()
            .ok_or_else(|| anyhow!("S3 event record has no object key"))?;
        Ok(Self::new(bucket.as_str(), key.as_str()))
    }

    /// The bucket and key of the first record, as far as they can be
    /// read, with [`UNKNOWN`] standing in for missing values.
    pub fn best_known(event: &S3Event) -> (String, String) {
        let record = event.records.first();
        let bucket = record
            .and_then(|r| r.s3.bucket.name.clone())
            .unwrap_or_else(|| String::from(UNKNOWN));
        let key = record
            .and_then(|r| r.s3.object.key.clone())
            .unwrap_or_else(|| String::from(UNKNOWN));
        (bucket, key)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// An S3 notification as delivered by the storage service, with
    /// one record per given (bucket, key) pair.
    pub(crate) fn s3_event(objects: &[(&str, &str)]) -> S3Event {
        let records: Vec<_> = objects
            .iter()
            .map(|(bucket, key)| {
                json!({
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "awsRegion": "us-east-2",
                    "eventTime": "2024-05-01T12:00:00.000Z",
                    "eventName": "ObjectCreated:Put",
                    "userIdentity": {"principalId": "EXAMPLE"},
                    "requestParameters": {"sourceIPAddress": "127.0.0.1"},
                    "responseElements": {},
                    "s3": {
                        "s3SchemaVersion": "1.0",
                        "configurationId": "face-upload",
                        "bucket": {
                            "name": bucket,
                            "ownerIdentity": {"principalId": "EXAMPLE"},
                            "arn": format!("arn:aws:s3:::{}", bucket)
                        },
                        "object": {
                            "key": key,
                            "size": 1024,
                            "eTag": "0123456789abcdef0123456789abcdef",
                            "sequencer": "0A1B2C3D4E5F678901"
                        }
                    }
                })
            })
            .collect();
        serde_json::from_value(json!({ "Records": records })).unwrap()
    }

    #[test]
    fn takes_the_first_record_only() {
        let event = s3_event(&[("uploads", "img1.jpg"), ("uploads", "img2.jpg")]);
        let upload = UploadEvent::from_s3_event(&event).unwrap();
        assert_eq!(upload, UploadEvent::new("uploads", "img1.jpg"));
    }

    #[test]
    fn rejects_an_empty_event() {
        let event = S3Event { records: vec![] };
        assert!(UploadEvent::from_s3_event(&event).is_err());
        assert_eq!(
            UploadEvent::best_known(&event),
            (String::from(UNKNOWN), String::from(UNKNOWN))
        );
    }

    #[test]
    fn rejects_a_record_without_key() {
        let mut event = s3_event(&[("uploads", "img1.jpg")]);
        event.records[0].s3.object.key = None;
        assert!(UploadEvent::from_s3_event(&event).is_err());
        assert_eq!(
            UploadEvent::best_known(&event),
            (String::from("uploads"), String::from(UNKNOWN))
        );
    }
}
