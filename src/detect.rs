//! Defines the face detection and face matching capabilities, and
//! their Rekognition implementations.

use crate::event::UploadEvent;
use crate::model::{decimal, AgeRange, Candidate, Emotion, FaceAttributes, Gender};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::types::{Attribute, FaceDetail, FaceMatch, Image, S3Object};
use aws_sdk_rekognition::Client;
use tracing::instrument;

/// The maximum amount of candidates requested when matching.
pub const MAX_FACES: i32 = 1;

/// The minimum similarity, in percent, for a candidate to be
/// returned.
pub const FACE_MATCH_THRESHOLD: f32 = 90.0;

/// Finds faces in an uploaded image.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect every face in the image, in the order the service
    /// reports them.
    async fn detect_faces(&self, event: &UploadEvent) -> Result<Vec<FaceAttributes>>;
}

/// Searches a face collection for the face in an uploaded image.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Candidates above the similarity threshold, best first.
    async fn search_faces(&self, event: &UploadEvent) -> Result<Vec<Candidate>>;

    /// The collection being searched.
    fn collection(&self) -> &str;
}

/// Reference an S3 object as a Rekognition image.
fn s3_image(event: &UploadEvent) -> Image {
    Image::builder()
        .s3_object(
            S3Object::builder()
                .bucket(&event.bucket)
                .name(&event.key)
                .build(),
        )
        .build()
}

/// Extract the attributes of a face detail. Absent fields are left
/// at zero, empty or `Unknown`.
fn face_attributes(face: &FaceDetail) -> Result<FaceAttributes> {
    let age_range = face
        .age_range()
        .map(|range| AgeRange {
            low: range.low().unwrap_or_default(),
            high: range.high().unwrap_or_default(),
        })
        .unwrap_or_default();
    let gender = Gender {
        value: face
            .gender()
            .and_then(|gender| gender.value())
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| String::from("Unknown")),
        confidence: decimal(
            face.gender()
                .and_then(|gender| gender.confidence())
                .unwrap_or_default(),
        )?,
    };
    let emotions = face
        .emotions()
        .iter()
        .map(|emotion| {
            Ok(Emotion {
                kind: emotion
                    .r#type()
                    .map(|kind| kind.as_str().to_string())
                    .unwrap_or_else(|| String::from("UNKNOWN")),
                confidence: decimal(emotion.confidence().unwrap_or_default())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FaceAttributes {
        age_range,
        gender,
        emotions,
    })
}

/// Extract a candidate from a face match.
fn candidate(face_match: &FaceMatch) -> Result<Candidate> {
    let face = face_match.face();
    Ok(Candidate {
        external_id: face
            .and_then(|face| face.external_image_id().or(face.face_id()))
            .unwrap_or("Unknown")
            .to_string(),
        similarity: decimal(face_match.similarity().unwrap_or_default())?,
    })
}

/// Face detection through Rekognition's DetectFaces.
pub struct RekognitionDetector {
    client: Client,
}

impl RekognitionDetector {
    pub fn new(client: Client) -> Self {
        RekognitionDetector { client }
    }
}

#[async_trait]
impl Detector for RekognitionDetector {
    #[instrument(skip(self))]
    async fn detect_faces(&self, event: &UploadEvent) -> Result<Vec<FaceAttributes>> {
        let response = self
            .client
            .detect_faces()
            .image(s3_image(event))
            .attributes(Attribute::All)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to detect faces in object {:?} from bucket {:?}",
                    event.key, event.bucket
                )
            })?;
        response.face_details().iter().map(face_attributes).collect()
    }
}

/// Face matching through Rekognition's SearchFacesByImage.
pub struct RekognitionMatcher {
    client: Client,
    collection: String,
}

impl RekognitionMatcher {
    pub fn new(client: Client, collection: impl Into<String>) -> Self {
        RekognitionMatcher {
            client,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Matcher for RekognitionMatcher {
    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn search_faces(&self, event: &UploadEvent) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .search_faces_by_image()
            .collection_id(&self.collection)
            .image(s3_image(event))
            .max_faces(MAX_FACES)
            .face_match_threshold(FACE_MATCH_THRESHOLD)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to search collection {:?} for object {:?} from bucket {:?}",
                    self.collection, event.key, event.bucket
                )
            })?;
        response.face_matches().iter().map(candidate).collect()
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
