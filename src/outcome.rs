//! Defines the results of running the face pipeline: the outcome of
//! a completed run, the error of a failed one, and the response
//! returned to the invoker.

use crate::model::MetadataRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Detect,
    Match,
    Store,
    Notify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Detect => "detect",
            Stage::Match => "match",
            Stage::Store => "store",
            Stage::Notify => "notify",
        })
    }
}

/// A failure, tagged with the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error:#}")]
pub struct PipelineError {
    pub stage: Stage,
    pub error: anyhow::Error,
}

/// Attaches the current stage to a failure.
pub trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> StageExt<T> for anyhow::Result<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|error| PipelineError { stage, error })
    }
}

/// How a completed run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The key didn't match the configured filter.
    Skipped,
    /// The image shows no face.
    NoFace,
    /// A face was found, matched and recorded.
    Processed(MetadataRecord),
}

/// The result object returned for every invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status_code: 200,
            body: body.into(),
        }
    }

    pub fn error(body: impl Into<String>) -> Self {
        Response {
            status_code: 500,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<&Outcome> for Response {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Skipped => Response::ok("Skipped: key does not match the configured filter."),
            Outcome::NoFace => Response::ok("No face detected."),
            Outcome::Processed(record) => Response::ok(format!(
                "Face processed. Match result: {}",
                record.matched_employee
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn errors_name_their_stage() {
        let result: anyhow::Result<()> =
            Err(anyhow!("access denied").context("Failed to detect faces"));
        let error = result.at(Stage::Detect).unwrap_err();
        assert_eq!(error.stage, Stage::Detect);
        assert_eq!(
            error.to_string(),
            "detect stage failed: Failed to detect faces: access denied"
        );
    }

    #[test]
    fn response_serializes_with_status_code() {
        let value = serde_json::to_value(Response::ok("No face detected.")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"statusCode": 200, "body": "No face detected."})
        );
    }
}
