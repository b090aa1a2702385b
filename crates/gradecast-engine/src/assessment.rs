//! Per-class feedback aggregation and consensus building.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use gradecast_core::model::{AggregatedAssessment, ClassId, Consensus, Feedback};
use gradecast_core::traits::KeyedStore;

use crate::error::EngineError;

/// Stores aggregated feedback per equivalence class and lazily derives an
/// automatic suggestion from it.
pub struct AssessmentIndex {
    confidence_threshold: f64,
    assessments: Arc<dyn KeyedStore<AggregatedAssessment>>,
    /// Serializes read-modify-write cycles on the assessments store.
    writer: Mutex<()>,
}

impl AssessmentIndex {
    pub fn new(
        confidence_threshold: f64,
        assessments: Arc<dyn KeyedStore<AggregatedAssessment>>,
    ) -> Self {
        Self {
            confidence_threshold,
            assessments,
            writer: Mutex::new(()),
        }
    }

    /// Append one feedback item to a class, creating the entry if absent.
    ///
    /// Feedback strictly accumulates; repeated grading events are not
    /// deduplicated. Appending invalidates any cached consensus.
    pub async fn add_feedback(&self, class: ClassId, feedback: Feedback) -> Result<(), EngineError> {
        let _writer = self.writer.lock().await;
        let key = class.to_string();
        let mut entry = self.assessments.get(&key).await?.unwrap_or_default();
        entry.push(feedback);
        self.assessments.put(&key, entry).await?;
        Ok(())
    }

    /// Number of feedback items recorded for a class.
    pub async fn feedback_count(&self, class: ClassId) -> Result<usize, EngineError> {
        Ok(self
            .assessments
            .get(&class.to_string())
            .await?
            .map(|entry| entry.feedback.len())
            .unwrap_or(0))
    }

    /// Classes with at least one feedback item, and the total item count.
    pub async fn totals(&self) -> Result<(usize, usize), EngineError> {
        let entries = self.assessments.entries().await?;
        let assessed = entries
            .iter()
            .filter(|(_, entry)| !entry.feedback.is_empty())
            .count();
        let items = entries.iter().map(|(_, entry)| entry.feedback.len()).sum();
        Ok((assessed, items))
    }

    /// Consensus for a class, or `None` when the class is unknown, has no
    /// feedback, or agreement stays below the confidence threshold.
    ///
    /// A successfully built consensus is cached on the stored entry and
    /// invalidated by the next `add_feedback`.
    pub async fn consensus(&self, class: ClassId) -> Result<Option<Consensus>, EngineError> {
        let _writer = self.writer.lock().await;
        let key = class.to_string();
        let Some(mut entry) = self.assessments.get(&key).await? else {
            return Ok(None);
        };
        if let Some(cached) = &entry.consensus {
            return Ok(Some(cached.clone()));
        }
        let Some(consensus) = build_consensus(&entry.feedback, self.confidence_threshold) else {
            return Ok(None);
        };
        entry.consensus = Some(consensus.clone());
        self.assessments.put(&key, entry).await?;
        Ok(Some(consensus))
    }
}

/// One credit-value group encountered during the consensus scan.
struct CreditGroup {
    credit: f64,
    count: u32,
    comments: BTreeSet<String>,
    instruction: Option<i64>,
}

/// Merge a feedback list into a single suggestion.
///
/// Groups by exact credit value; the majority group wins, ties resolving
/// to the lowest credit value. A grading-instruction reference (the most
/// recently seen one within the group) takes precedence over comments;
/// otherwise the longest distinct comment is used, equal lengths resolving
/// to the lexicographically smallest.
fn build_consensus(feedback: &[Feedback], confidence_threshold: f64) -> Option<Consensus> {
    if feedback.is_empty() {
        return None;
    }

    let mut groups: Vec<CreditGroup> = Vec::new();
    for item in feedback {
        match groups.iter_mut().find(|group| group.credit == item.credit) {
            Some(group) => {
                group.count += 1;
                if let Some(comment) = &item.comment {
                    group.comments.insert(comment.clone());
                }
                if item.grading_instruction.is_some() {
                    group.instruction = item.grading_instruction;
                }
            }
            None => groups.push(CreditGroup {
                credit: item.credit,
                count: 1,
                comments: item.comment.iter().cloned().collect(),
                instruction: item.grading_instruction,
            }),
        }
    }

    let winner = groups.iter().reduce(|best, group| {
        if group.count > best.count || (group.count == best.count && group.credit < best.credit) {
            group
        } else {
            best
        }
    })?;

    let confidence = f64::from(winner.count) / feedback.len() as f64;
    if confidence < confidence_threshold {
        return None;
    }

    let mut suggestion = Feedback::propagated(round_credit(winner.credit));
    if let Some(instruction) = winner.instruction {
        suggestion = suggestion.with_instruction(instruction);
    } else if let Some(comment) = longest_comment(&winner.comments) {
        suggestion = suggestion.with_comment(comment);
    }

    Some(Consensus {
        feedback: suggestion,
        confidence,
        votes: winner.count,
    })
}

fn longest_comment(comments: &BTreeSet<String>) -> Option<&str> {
    let mut best: Option<&str> = None;
    for comment in comments {
        if best.map_or(true, |current| comment.len() > current.len()) {
            best = Some(comment);
        }
    }
    best
}

/// Round credit to the nearest half point with a 0.15 grace band: a
/// fractional part below 0.15 rounds down, one from 0.15 up to (but not
/// including) 0.65 rounds to the half, anything at 0.65 or above rounds
/// up. Negative values are rounded as if shifted up by one and shifted
/// back afterwards.
pub fn round_credit(credit: f64) -> f64 {
    let shifted = if credit < 0.0 { credit + 1.0 } else { credit };
    let base = shifted.floor();
    let frac = shifted - base - 0.15;
    let rounded = if frac >= 0.5 {
        base + 1.0
    } else if frac >= 0.0 {
        base + 0.5
    } else {
        base
    };
    if credit < 0.0 {
        rounded - 1.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use gradecast_core::memory::MemoryStore;

    fn index(confidence_threshold: f64) -> AssessmentIndex {
        AssessmentIndex::new(confidence_threshold, Arc::new(MemoryStore::new()))
    }

    async fn add_credits(index: &AssessmentIndex, class: ClassId, credits: &[f64]) {
        for &credit in credits {
            index
                .add_feedback(class, Feedback::manual(credit))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn consensus_suppressed_below_confidence_threshold() {
        let index = index(0.9);
        add_credits(&index, ClassId(0), &[1.0, 1.0, 1.0, 2.0]).await;
        assert!(index.consensus(ClassId(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn consensus_built_above_confidence_threshold() {
        let index = index(0.5);
        add_credits(&index, ClassId(0), &[1.0, 1.0, 1.0, 2.0]).await;

        let consensus = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert!((consensus.feedback.credit - 1.0).abs() < f64::EPSILON);
        assert!((consensus.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(consensus.votes, 3);
        assert_eq!(
            consensus.feedback.origin,
            gradecast_core::model::FeedbackOrigin::Propagated
        );
    }

    #[tokio::test]
    async fn unknown_or_empty_class_has_no_consensus() {
        let index = index(0.5);
        assert!(index.consensus(ClassId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credit_ties_resolve_to_lowest_value() {
        let index = index(0.0);
        add_credits(&index, ClassId(0), &[2.0, 1.0, 2.0, 1.0]).await;

        let consensus = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert!((consensus.feedback.credit - 1.0).abs() < f64::EPSILON);
        assert_eq!(consensus.votes, 2);
        assert!((consensus.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn longest_distinct_comment_wins() {
        let index = index(0.5);
        index
            .add_feedback(ClassId(0), Feedback::manual(1.0).with_comment("ok"))
            .await
            .unwrap();
        index
            .add_feedback(
                ClassId(0),
                Feedback::manual(1.0).with_comment("missing multiplicity"),
            )
            .await
            .unwrap();
        index
            .add_feedback(ClassId(0), Feedback::manual(1.0).with_comment("ok"))
            .await
            .unwrap();

        let consensus = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert_eq!(
            consensus.feedback.comment.as_deref(),
            Some("missing multiplicity")
        );
    }

    #[tokio::test]
    async fn equal_length_comments_resolve_lexicographically() {
        let index = index(0.0);
        index
            .add_feedback(ClassId(0), Feedback::manual(1.0).with_comment("beta"))
            .await
            .unwrap();
        index
            .add_feedback(ClassId(0), Feedback::manual(1.0).with_comment("alfa"))
            .await
            .unwrap();

        let consensus = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert_eq!(consensus.feedback.comment.as_deref(), Some("alfa"));
    }

    #[tokio::test]
    async fn instruction_reference_beats_comments() {
        let index = index(0.5);
        index
            .add_feedback(
                ClassId(0),
                Feedback::manual(1.0).with_comment("a very long explanation"),
            )
            .await
            .unwrap();
        index
            .add_feedback(ClassId(0), Feedback::manual(1.0).with_instruction(7))
            .await
            .unwrap();

        let consensus = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert_eq!(consensus.feedback.grading_instruction, Some(7));
        assert!(consensus.feedback.comment.is_none());
    }

    #[tokio::test]
    async fn consensus_recomputed_after_append() {
        let index = index(0.5);
        add_credits(&index, ClassId(0), &[1.0, 1.0]).await;
        let first = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert!((first.confidence - 1.0).abs() < f64::EPSILON);

        index
            .add_feedback(ClassId(0), Feedback::manual(2.0))
            .await
            .unwrap();
        let second = index.consensus(ClassId(0)).await.unwrap().unwrap();
        assert!((second.confidence - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(second.votes, 2);
    }

    #[tokio::test]
    async fn feedback_accumulates_without_dedup() {
        let index = index(0.5);
        add_credits(&index, ClassId(3), &[1.0, 1.0, 1.0]).await;
        assert_eq!(index.feedback_count(ClassId(3)).await.unwrap(), 3);

        let (assessed, items) = index.totals().await.unwrap();
        assert_eq!(assessed, 1);
        assert_eq!(items, 3);
    }

    #[test]
    fn rounding_table() {
        assert_eq!(round_credit(1.05), 1.0);
        assert_eq!(round_credit(1.20), 1.5);
        assert_eq!(round_credit(1.70), 2.0);
        assert_eq!(round_credit(-2.20), -2.0);
        assert_eq!(round_credit(-2.90), -3.0);
    }

    #[test]
    fn rounding_whole_and_half_values_are_stable() {
        assert_eq!(round_credit(0.0), 0.0);
        assert_eq!(round_credit(2.0), 2.0);
        assert_eq!(round_credit(1.5), 1.5);
        assert_eq!(round_credit(-1.5), -1.5);
    }
}
