//! Collaborator trait definitions: the diagram layer and the keyed store.
//!
//! Diagram ingestion and persistence live outside this repository; these
//! traits are the seams the engine components are written against.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{ElementContext, SubmissionId};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Diagram layer
// ---------------------------------------------------------------------------

/// A single element of a diagram submission.
pub trait ModelElement: Send + Sync {
    /// Stable identifier, unique within the owning submission.
    fn id(&self) -> &str;

    /// Type tag (e.g. "class", "relationship").
    fn kind(&self) -> &str;

    /// Structural context. Metadata only.
    fn context(&self) -> ElementContext {
        ElementContext::Standalone
    }

    /// Symmetric similarity score in a type-dependent range.
    ///
    /// Must be total: comparing mismatched kinds returns a non-matching
    /// value rather than panicking. Callers only rely on
    /// greater-than-threshold semantics.
    fn similarity_to(&self, other: &dyn ModelElement) -> f64;
}

/// A complete student submission (one diagram).
pub trait SubmissionModel: Send + Sync {
    /// Identifier of the submission within its exercise.
    fn id(&self) -> SubmissionId;

    /// All elements of the diagram.
    fn elements(&self) -> Vec<Arc<dyn ModelElement>>;

    /// Whole-submission similarity, consumed by the selector.
    fn similarity_to(&self, other: &dyn SubmissionModel) -> f64;
}

// ---------------------------------------------------------------------------
// Keyed store
// ---------------------------------------------------------------------------

/// Minimal keyed store contract, one instance per namespace (assignments,
/// representatives, submissions, aggregated assessments).
///
/// Assumed linearizable per key. Values are held as live objects rather
/// than serialized bytes so representatives keep their similarity
/// capability.
#[async_trait]
pub trait KeyedStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Fetch the value for a key, if present.
    async fn get(&self, key: &str) -> StoreResult<Option<V>>;

    /// Insert or replace the value for a key.
    async fn put(&self, key: &str, value: V) -> StoreResult<()>;

    /// Check whether a key is present.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remove a key. No-op if absent. Used to roll back the surviving half
    /// of a failed multi-write sequence.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Number of entries.
    async fn len(&self) -> StoreResult<usize>;

    /// Snapshot of all entries, in no particular order.
    async fn entries(&self) -> StoreResult<Vec<(String, V)>>;
}
