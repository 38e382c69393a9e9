//! Defines the values derived from one upload: the attributes of the
//! detected face, the result of matching it, and the record stored
//! for it.

use crate::event::UploadEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Employee id recorded when the face matched nobody in the
/// collection.
pub const NO_MATCH: &str = "No match found";

/// Convert a confidence or similarity score reported by the service
/// into an exact decimal, keeping the shortest decimal rendering of
/// the float.
pub fn decimal(value: f32) -> Result<Decimal> {
    let rendered = value.to_string();
    Decimal::from_str(&rendered)
        .with_context(|| format!("Failed to represent score {} as a decimal", rendered))
}

/// Estimated age range of a face, in years.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgeRange {
    pub low: i32,
    pub high: i32,
}

/// Estimated gender of a face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gender {
    /// `Male` or `Female`, as reported by the service.
    pub value: String,
    pub confidence: Decimal,
}

/// One emotion estimate, e.g. `HAPPY` at 93.2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emotion {
    pub kind: String,
    pub confidence: Decimal,
}

/// Attributes of a single detected face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaceAttributes {
    pub age_range: AgeRange,
    pub gender: Gender,
    /// In the order the service reported them.
    pub emotions: Vec<Emotion>,
}

/// A face from the collection resembling the uploaded one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// The external id the reference face was indexed with.
    pub external_id: String,
    pub similarity: Decimal,
}

/// Outcome of searching the collection for the uploaded face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub employee_id: String,
    pub confidence: Decimal,
}

impl MatchResult {
    /// Derive the match from the candidates, best first. Only the top
    /// candidate counts.
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        match candidates.into_iter().next() {
            Some(top) => MatchResult {
                matched: true,
                employee_id: top.external_id,
                confidence: top.similarity,
            },
            None => MatchResult {
                matched: false,
                employee_id: String::from(NO_MATCH),
                confidence: Decimal::ZERO,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "MATCHED",
            MatchStatus::Unmatched => "UNMATCHED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record stored for each processed image, keyed by the object
/// key. Reprocessing the same key replaces the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataRecord {
    pub face_id: String,
    pub image_key: String,
    pub bucket: String,
    pub match_status: MatchStatus,
    pub matched_employee: String,
    pub match_confidence: Decimal,
    pub attributes: FaceAttributes,
    pub processed_at: DateTime<Utc>,
}

impl MetadataRecord {
    pub fn new(
        event: &UploadEvent,
        attributes: FaceAttributes,
        result: MatchResult,
        processed_at: DateTime<Utc>,
    ) -> Self {
        MetadataRecord {
            face_id: event.key.clone(),
            image_key: event.key.clone(),
            bucket: event.bucket.clone(),
            match_status: if result.matched {
                MatchStatus::Matched
            } else {
                MatchStatus::Unmatched
            },
            matched_employee: result.employee_id,
            match_confidence: result.confidence,
            attributes,
            processed_at,
        }
    }

    /// The processing time as stored, e.g. `2024-05-01T12:00:00Z`.
    pub fn processed_at_rfc3339(&self) -> String {
        self.processed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
