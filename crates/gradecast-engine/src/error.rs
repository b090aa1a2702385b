//! Engine error types.

use gradecast_core::error::StoreError;
use gradecast_core::model::SubmissionId;
use thiserror::Error;

/// Errors surfaced by the grading engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A keyed-store operation failed. The triggering operation is rolled
    /// back or never committed; see the store for details.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The submission is not registered with this exercise.
    #[error("unknown submission: {0}")]
    UnknownSubmission(SubmissionId),

    /// The exercise configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
