//! Core data model types for gradecast.
//!
//! These are the fundamental types the whole system uses to represent
//! equivalence classes, feedback, and aggregated assessments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a student submission within one exercise.
pub type SubmissionId = u64;

/// Dense, per-exercise identifier of an equivalence class.
///
/// Assigned in creation order starting at 0, never reassigned, never
/// reused within an exercise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite store key for an element.
///
/// Element ids are only unique within their submission, so the reverse
/// index keys on both.
pub fn element_key(submission: SubmissionId, element_id: &str) -> String {
    format!("{submission}/{element_id}")
}

/// Structural context of an element within its diagram.
///
/// Recorded alongside the class assignment and resolved post-hoc by
/// consumers; carries no influence on clustering or consensus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementContext {
    /// The element stands on its own (e.g. a class or a relationship).
    #[default]
    Standalone,
    /// The element is owned by another element of the same submission
    /// (e.g. an attribute of a class), identified by the owner's id.
    ChildOf(String),
}

/// Where a feedback item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackOrigin {
    /// Entered by a human assessor.
    Manual,
    /// Synthesized from an equivalence class consensus.
    Propagated,
}

/// A single feedback item for one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Credit awarded. May be negative for deductions.
    pub credit: f64,
    /// Free-text comment shown to the student.
    #[serde(default)]
    pub comment: Option<String>,
    /// Reference to a structured grading instruction.
    #[serde(default)]
    pub grading_instruction: Option<i64>,
    /// Provenance tag.
    pub origin: FeedbackOrigin,
}

impl Feedback {
    /// Manually entered feedback with the given credit.
    pub fn manual(credit: f64) -> Self {
        Self {
            credit,
            comment: None,
            grading_instruction: None,
            origin: FeedbackOrigin::Manual,
        }
    }

    /// Automatically synthesized feedback with the given credit.
    pub fn propagated(credit: f64) -> Self {
        Self {
            credit,
            comment: None,
            grading_instruction: None,
            origin: FeedbackOrigin::Propagated,
        }
    }

    /// Attach a free-text comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Attach a grading-instruction reference.
    pub fn with_instruction(mut self, instruction: i64) -> Self {
        self.grading_instruction = Some(instruction);
        self
    }
}

/// The synthesized result of merging one class's feedback items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    /// The synthesized automatic suggestion.
    pub feedback: Feedback,
    /// Fraction of feedback items agreeing with the majority credit value.
    pub confidence: f64,
    /// Size of the majority group.
    pub votes: u32,
}

/// Class assignment recorded for one element in the reverse index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAssignment {
    pub class_id: ClassId,
    /// The element's structural context at classification time.
    #[serde(default)]
    pub context: ElementContext,
}

/// Per-class aggregated assessment: raw feedback plus cached consensus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedAssessment {
    /// Feedback items in insertion order. Append-only; repeated grading
    /// events strictly accumulate.
    pub feedback: Vec<Feedback>,
    /// Cached consensus. `None` until computed, reset on every append.
    #[serde(default)]
    pub consensus: Option<Consensus>,
}

impl AggregatedAssessment {
    /// Append one feedback item and invalidate the cached consensus.
    pub fn push(&mut self, item: Feedback) {
        self.feedback.push(item);
        self.consensus = None;
    }
}
