//! Online clustering of diagram elements into equivalence classes.

use std::sync::Arc;

use tokio::sync::Mutex;

use gradecast_core::model::{element_key, ClassAssignment, ClassId, SubmissionId};
use gradecast_core::traits::{KeyedStore, ModelElement};

use crate::error::EngineError;

/// Groups structurally equivalent elements across all submissions of an
/// exercise into dense, creation-ordered equivalence classes.
///
/// Only class representatives are ever compared, so classifying one
/// element costs O(#classes) similarity calls, not O(#elements).
pub struct SimilarityIndex {
    equality_threshold: f64,
    assignments: Arc<dyn KeyedStore<ClassAssignment>>,
    representatives: Arc<dyn KeyedStore<Arc<dyn ModelElement>>>,
    /// Serializes the scan-then-insert sequence: two concurrent
    /// classifications of mutually novel elements must not both miss the
    /// other's not-yet-committed class.
    writer: Mutex<()>,
}

impl SimilarityIndex {
    pub fn new(
        equality_threshold: f64,
        assignments: Arc<dyn KeyedStore<ClassAssignment>>,
        representatives: Arc<dyn KeyedStore<Arc<dyn ModelElement>>>,
    ) -> Self {
        Self {
            equality_threshold,
            assignments,
            representatives,
            writer: Mutex::new(()),
        }
    }

    /// Class assignment previously recorded for an element, if any.
    pub async fn assignment(
        &self,
        submission: SubmissionId,
        element_id: &str,
    ) -> Result<Option<ClassAssignment>, EngineError> {
        Ok(self
            .assignments
            .get(&element_key(submission, element_id))
            .await?)
    }

    /// Number of classes created so far.
    pub async fn class_count(&self) -> Result<usize, EngineError> {
        Ok(self.representatives.len().await?)
    }

    /// Number of classified elements.
    pub async fn assignment_count(&self) -> Result<usize, EngineError> {
        Ok(self.assignments.len().await?)
    }

    /// Representative element of one class.
    pub async fn representative(
        &self,
        class: ClassId,
    ) -> Result<Option<Arc<dyn ModelElement>>, EngineError> {
        Ok(self.representatives.get(&class.to_string()).await?)
    }

    /// Assign `element` to an equivalence class. Idempotent per element:
    /// a previously classified element keeps its class id unchanged.
    pub async fn classify(
        &self,
        element: &Arc<dyn ModelElement>,
        submission: SubmissionId,
    ) -> Result<ClassId, EngineError> {
        let key = element_key(submission, element.id());
        if let Some(existing) = self.assignments.get(&key).await? {
            return Ok(existing.class_id);
        }

        let _writer = self.writer.lock().await;
        // Re-check: another task may have classified this element while we
        // waited for the writer.
        if let Some(existing) = self.assignments.get(&key).await? {
            return Ok(existing.class_id);
        }

        match self.best_match(element.as_ref()).await? {
            Some(class_id) => {
                let assignment = ClassAssignment {
                    class_id,
                    context: element.context(),
                };
                self.assignments.put(&key, assignment).await?;
                Ok(class_id)
            }
            None => {
                let class_id = ClassId(self.representatives.len().await? as u32);
                let rep_key = class_id.to_string();
                self.representatives
                    .put(&rep_key, Arc::clone(element))
                    .await?;
                let assignment = ClassAssignment {
                    class_id,
                    context: element.context(),
                };
                if let Err(err) = self.assignments.put(&key, assignment).await {
                    // Undo the class creation so a failed classify commits
                    // nothing.
                    if let Err(undo) = self.representatives.remove(&rep_key).await {
                        tracing::warn!("failed to roll back representative {rep_key}: {undo}");
                    }
                    return Err(err.into());
                }
                tracing::debug!("class {class_id} created for element {key}");
                Ok(class_id)
            }
        }
    }

    /// Scan all representatives for the best match strictly above the
    /// equality threshold.
    ///
    /// The scan runs in ascending class id order, so equal scores resolve
    /// to the earliest class. Non-finite similarity values are treated as
    /// non-matching.
    async fn best_match(&self, element: &dyn ModelElement) -> Result<Option<ClassId>, EngineError> {
        let mut representatives = self.representatives.entries().await?;
        representatives.sort_by_key(|(key, _)| key.parse::<u32>().unwrap_or(u32::MAX));

        let mut best: Option<(ClassId, f64)> = None;
        for (key, representative) in representatives {
            let Ok(id) = key.parse::<u32>() else {
                tracing::warn!("ignoring representative with malformed key '{key}'");
                continue;
            };
            let score = element.similarity_to(representative.as_ref());
            if !score.is_finite() {
                tracing::warn!(
                    "non-finite similarity between element '{}' and class {id}, treating as non-matching",
                    element.id()
                );
                continue;
            }
            let bar = best.map(|(_, s)| s).unwrap_or(self.equality_threshold);
            if score > bar {
                best = Some((ClassId(id), score));
            }
        }
        Ok(best.map(|(id, _)| id))
    }
}
