//! In-memory fakes for the collaborator traits.
//!
//! `MemoryStore` satisfies the `KeyedStore` contract without external
//! dependencies; `StubElement` and `StubSubmission` drive the diagram
//! seams from a fixed similarity table. Used by tests, benches, and
//! single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::model::{ElementContext, SubmissionId};
use crate::traits::{KeyedStore, ModelElement, StoreResult, SubmissionModel};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory keyed store backed by `RwLock<HashMap>`.
///
/// Every operation takes the lock for its whole duration, so each key is
/// trivially linearizable.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<V> KeyedStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: V) -> StoreResult<()> {
        self.entries.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.read().unwrap().contains_key(key))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().unwrap().len())
    }

    async fn entries(&self) -> StoreResult<Vec<(String, V)>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SimilarityTable
// ---------------------------------------------------------------------------

/// Pairwise similarity lookup shared by stub elements and submissions.
///
/// Keys are unordered label pairs; lookups are symmetric, identical labels
/// score 1.0, and unknown pairs default to 0.0. Labels must be unique
/// across the table (element ids are reused verbatim, submissions use
/// [`StubSubmission::label`]).
#[derive(Debug, Default)]
pub struct SimilarityTable {
    scores: Mutex<HashMap<(String, String), f64>>,
}

impl SimilarityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the similarity between two labels (order-insensitive).
    pub fn set(&self, a: impl Into<String>, b: impl Into<String>, score: f64) {
        let key = Self::pair(a.into(), b.into());
        self.scores.lock().unwrap().insert(key, score);
    }

    /// Look up the similarity between two labels.
    pub fn get(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let key = Self::pair(a.to_string(), b.to_string());
        self.scores.lock().unwrap().get(&key).copied().unwrap_or(0.0)
    }

    fn pair(a: String, b: String) -> (String, String) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

// ---------------------------------------------------------------------------
// StubElement / StubSubmission
// ---------------------------------------------------------------------------

/// Diagram element fake driven by a shared similarity table.
pub struct StubElement {
    id: String,
    kind: String,
    context: ElementContext,
    table: Arc<SimilarityTable>,
}

impl StubElement {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, table: Arc<SimilarityTable>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            context: ElementContext::Standalone,
            table,
        }
    }

    pub fn with_context(mut self, context: ElementContext) -> Self {
        self.context = context;
        self
    }
}

impl ModelElement for StubElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn context(&self) -> ElementContext {
        self.context.clone()
    }

    fn similarity_to(&self, other: &dyn ModelElement) -> f64 {
        if self.kind != other.kind() {
            return 0.0;
        }
        self.table.get(&self.id, other.id())
    }
}

/// Submission fake holding stub elements and a table-driven whole-diagram
/// similarity.
pub struct StubSubmission {
    id: SubmissionId,
    elements: Vec<Arc<dyn ModelElement>>,
    table: Arc<SimilarityTable>,
}

impl StubSubmission {
    pub fn new(id: SubmissionId, table: Arc<SimilarityTable>) -> Self {
        Self {
            id,
            elements: Vec::new(),
            table,
        }
    }

    /// Table label under which this submission's pairwise similarity is
    /// recorded.
    pub fn label(id: SubmissionId) -> String {
        format!("submission-{id}")
    }

    pub fn with_element(mut self, element: StubElement) -> Self {
        self.elements.push(Arc::new(element));
        self
    }
}

impl SubmissionModel for StubSubmission {
    fn id(&self) -> SubmissionId {
        self.id
    }

    fn elements(&self) -> Vec<Arc<dyn ModelElement>> {
        self.elements.clone()
    }

    fn similarity_to(&self, other: &dyn SubmissionModel) -> f64 {
        self.table.get(&Self::label(self.id), &Self::label(other.id()))
    }
}
