//! Store error types.
//!
//! Defined in `gradecast-core` so engine components and store
//! implementations share one error vocabulary without downcasting.

use thiserror::Error;

/// Errors surfaced by a keyed store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A stored value could not be interpreted.
    #[error("corrupt entry at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}
