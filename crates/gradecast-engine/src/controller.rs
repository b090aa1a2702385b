//! Feedback propagation and coverage/confidence scoring.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gradecast_core::model::{Feedback, SubmissionId};
use gradecast_core::traits::SubmissionModel;

use crate::assessment::AssessmentIndex;
use crate::error::EngineError;
use crate::similarity::SimilarityIndex;

/// Resolved automatic scores for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionScore {
    pub submission: SubmissionId,
    /// Element id → synthesized feedback, for every covered element.
    pub scores: BTreeMap<String, Feedback>,
    /// Covered elements / total elements; 1.0 for an empty submission.
    pub coverage: f64,
    /// Mean consensus confidence over the covered elements; 1.0 for an
    /// empty submission, 0.0 when nothing is covered.
    pub confidence: f64,
}

/// Exercise-wide score snapshot.
///
/// Built fresh on every call and never mutated afterwards, so concurrent
/// callers cannot observe a partial recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseScore {
    /// Unique snapshot identifier.
    pub id: Uuid,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
    /// Number of submissions scored.
    pub submission_count: usize,
    /// Mean coverage across all submissions.
    pub mean_coverage: f64,
    /// Mean confidence across all submissions.
    pub mean_confidence: f64,
}

impl ExerciseScore {
    /// Save the snapshot as JSON to a file.
    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("failed to serialize score snapshot")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write score snapshot to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot from a JSON file.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read score snapshot from {}", path.display()))?;
        let score: ExerciseScore =
            serde_json::from_str(&content).context("failed to parse score snapshot JSON")?;
        Ok(score)
    }
}

/// Drives feedback propagation and computes coverage and confidence on
/// top of the similarity and assessment indices.
pub struct AssessmentController {
    similarity: Arc<SimilarityIndex>,
    assessments: Arc<AssessmentIndex>,
}

impl AssessmentController {
    pub fn new(similarity: Arc<SimilarityIndex>, assessments: Arc<AssessmentIndex>) -> Self {
        Self {
            similarity,
            assessments,
        }
    }

    /// Feed manually entered feedback into the per-class aggregates.
    ///
    /// Elements without a class assignment are skipped, not an error;
    /// returns how many items were applied.
    pub async fn propagate(
        &self,
        submission: SubmissionId,
        feedback: &BTreeMap<String, Feedback>,
    ) -> Result<usize, EngineError> {
        let mut applied = 0;
        for (element_id, item) in feedback {
            match self.similarity.assignment(submission, element_id).await? {
                Some(assignment) => {
                    self.assessments
                        .add_feedback(assignment.class_id, item.clone())
                        .await?;
                    applied += 1;
                }
                None => {
                    tracing::debug!(
                        "no class for element {submission}/{element_id}, skipping feedback"
                    );
                }
            }
        }
        Ok(applied)
    }

    /// Score one submission against the current consensus state.
    pub async fn score_submission(
        &self,
        submission: &dyn SubmissionModel,
    ) -> Result<SubmissionScore, EngineError> {
        let elements = submission.elements();
        let total = elements.len();
        let mut scores = BTreeMap::new();
        let mut confidence_sum = 0.0;

        for element in &elements {
            let Some(assignment) = self
                .similarity
                .assignment(submission.id(), element.id())
                .await?
            else {
                continue;
            };
            let Some(consensus) = self.assessments.consensus(assignment.class_id).await? else {
                continue;
            };
            confidence_sum += consensus.confidence;
            scores.insert(element.id().to_string(), consensus.feedback);
        }

        let covered = scores.len();
        let coverage = if total == 0 {
            1.0
        } else {
            covered as f64 / total as f64
        };
        let confidence = if total == 0 {
            1.0
        } else if covered == 0 {
            0.0
        } else {
            confidence_sum / covered as f64
        };

        Ok(SubmissionScore {
            submission: submission.id(),
            scores,
            coverage,
            confidence,
        })
    }

    /// Recompute every submission and average the two metrics.
    ///
    /// Not incremental: costs O(submissions × elements) consensus lookups
    /// per call. An exercise without submissions scores 1.0 on both means.
    pub async fn score_exercise(
        &self,
        submissions: &[Arc<dyn SubmissionModel>],
    ) -> Result<ExerciseScore, EngineError> {
        let scored = try_join_all(
            submissions
                .iter()
                .map(|submission| self.score_submission(submission.as_ref())),
        )
        .await?;

        let count = scored.len();
        let (mean_coverage, mean_confidence) = if count == 0 {
            (1.0, 1.0)
        } else {
            (
                scored.iter().map(|s| s.coverage).sum::<f64>() / count as f64,
                scored.iter().map(|s| s.confidence).sum::<f64>() / count as f64,
            )
        };

        Ok(ExerciseScore {
            id: Uuid::new_v4(),
            computed_at: Utc::now(),
            submission_count: count,
            mean_coverage,
            mean_confidence,
        })
    }
}
