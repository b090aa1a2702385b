//! Per-exercise engine: the four components wired over one set of stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gradecast_core::config::ExerciseConfig;
use gradecast_core::memory::MemoryStore;
use gradecast_core::model::{
    AggregatedAssessment, ClassAssignment, ClassId, Feedback, SubmissionId,
};
use gradecast_core::traits::{KeyedStore, ModelElement, SubmissionModel};

use crate::assessment::AssessmentIndex;
use crate::controller::{AssessmentController, ExerciseScore, SubmissionScore};
use crate::error::EngineError;
use crate::selector::SubmissionSelector;
use crate::similarity::SimilarityIndex;

/// The keyed stores backing one exercise, one per namespace.
pub struct ExerciseStores {
    pub assignments: Arc<dyn KeyedStore<ClassAssignment>>,
    pub representatives: Arc<dyn KeyedStore<Arc<dyn ModelElement>>>,
    pub submissions: Arc<dyn KeyedStore<Arc<dyn SubmissionModel>>>,
    pub assessments: Arc<dyn KeyedStore<AggregatedAssessment>>,
}

impl ExerciseStores {
    /// In-memory stores, for tests and single-process deployments.
    pub fn in_memory() -> Self {
        Self {
            assignments: Arc::new(MemoryStore::new()),
            representatives: Arc::new(MemoryStore::new()),
            submissions: Arc::new(MemoryStore::new()),
            assessments: Arc::new(MemoryStore::new()),
        }
    }
}

/// Aggregate view of one exercise's engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Registered submissions.
    pub submissions: usize,
    /// Equivalence classes created so far.
    pub classes: usize,
    /// Classes with at least one feedback item.
    pub assessed_classes: usize,
    /// Total feedback items across all classes.
    pub feedback_items: usize,
    /// Mean number of elements per class.
    pub mean_class_size: f64,
}

/// One exercise's grading engine: classification, propagation, scoring,
/// and selection behind a single handle.
///
/// All per-exercise state is owned by this object or its stores; nothing
/// is process-global.
pub struct ExerciseEngine {
    config: ExerciseConfig,
    submissions: Arc<dyn KeyedStore<Arc<dyn SubmissionModel>>>,
    similarity: Arc<SimilarityIndex>,
    assessments: Arc<AssessmentIndex>,
    controller: AssessmentController,
    selector: SubmissionSelector,
}

impl ExerciseEngine {
    /// Build an engine over the given stores. Fails on an invalid
    /// configuration.
    pub fn new(config: ExerciseConfig, stores: ExerciseStores) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let similarity = Arc::new(SimilarityIndex::new(
            config.equality_threshold,
            stores.assignments,
            stores.representatives,
        ));
        let assessments = Arc::new(AssessmentIndex::new(
            config.confidence_threshold,
            stores.assessments,
        ));
        let controller =
            AssessmentController::new(Arc::clone(&similarity), Arc::clone(&assessments));
        let selector = SubmissionSelector::new(config.clone());
        Ok(Self {
            config,
            submissions: stores.submissions,
            similarity,
            assessments,
            controller,
            selector,
        })
    }

    /// Engine with in-memory stores.
    pub fn in_memory(config: ExerciseConfig) -> Result<Self, EngineError> {
        Self::new(config, ExerciseStores::in_memory())
    }

    pub fn config(&self) -> &ExerciseConfig {
        &self.config
    }

    /// Register a submission and classify all of its elements.
    ///
    /// Safe to repeat for the same submission: classification is
    /// idempotent per element, so already classified elements keep their
    /// class ids.
    pub async fn submit(
        &self,
        submission: Arc<dyn SubmissionModel>,
    ) -> Result<Vec<ClassId>, EngineError> {
        self.submissions
            .put(&submission.id().to_string(), Arc::clone(&submission))
            .await?;
        let mut classes = Vec::new();
        for element in submission.elements() {
            classes.push(self.similarity.classify(&element, submission.id()).await?);
        }
        tracing::debug!(
            "submission {} classified into {} element classes",
            submission.id(),
            classes.len()
        );
        Ok(classes)
    }

    /// Feed one manual assessment into the per-class aggregates.
    pub async fn propagate(
        &self,
        submission: SubmissionId,
        feedback: &BTreeMap<String, Feedback>,
    ) -> Result<usize, EngineError> {
        self.controller.propagate(submission, feedback).await
    }

    /// Score one registered submission.
    pub async fn score_submission(
        &self,
        submission: SubmissionId,
    ) -> Result<SubmissionScore, EngineError> {
        let model = self
            .submissions
            .get(&submission.to_string())
            .await?
            .ok_or(EngineError::UnknownSubmission(submission))?;
        self.controller.score_submission(model.as_ref()).await
    }

    /// Score every registered submission and average the metrics.
    pub async fn score_exercise(&self) -> Result<ExerciseScore, EngineError> {
        let submissions = self.all_submissions().await?;
        self.controller.score_exercise(&submissions).await
    }

    /// Pick the next submissions for manual grading.
    ///
    /// Coverage is recomputed for every eligible submission before
    /// ranking; `is_unassessed` is the workflow predicate for the
    /// fallback path.
    pub async fn select_next(
        &self,
        count: usize,
        is_unassessed: &dyn Fn(SubmissionId) -> bool,
    ) -> Result<Vec<SubmissionId>, EngineError> {
        let submissions = self.all_submissions().await?;
        let mut coverages = HashMap::new();
        for submission in &submissions {
            if self.selector.is_handled(submission.id()) {
                continue;
            }
            let score = self.controller.score_submission(submission.as_ref()).await?;
            coverages.insert(submission.id(), score.coverage);
        }
        Ok(self
            .selector
            .select_next(count, &submissions, &coverages, is_unassessed))
    }

    /// Mark a submission's manual assessment as completed.
    pub fn mark_assessed(&self, submission: SubmissionId) {
        self.selector.mark_assessed(submission);
    }

    /// Release a submission back into the selection pool.
    pub fn release(&self, submission: SubmissionId) {
        self.selector.release(submission);
    }

    /// Submissions currently waiting for a manual assessment.
    pub fn waiting(&self) -> Vec<SubmissionId> {
        self.selector.waiting()
    }

    /// Current engine state counters.
    pub async fn statistics(&self) -> Result<EngineStatistics, EngineError> {
        let submissions = self.submissions.len().await?;
        let classes = self.similarity.class_count().await?;
        let assignments = self.similarity.assignment_count().await?;
        let (assessed_classes, feedback_items) = self.assessments.totals().await?;
        let mean_class_size = if classes == 0 {
            0.0
        } else {
            assignments as f64 / classes as f64
        };
        Ok(EngineStatistics {
            submissions,
            classes,
            assessed_classes,
            feedback_items,
            mean_class_size,
        })
    }

    async fn all_submissions(&self) -> Result<Vec<Arc<dyn SubmissionModel>>, EngineError> {
        let mut entries = self.submissions.entries().await?;
        // Ascending id order keeps selection deterministic.
        entries.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));
        Ok(entries.into_iter().map(|(_, model)| model).collect())
    }
}
