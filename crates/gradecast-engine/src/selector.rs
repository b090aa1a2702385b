//! Active-learning selection of the next submissions to grade manually.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gradecast_core::config::ExerciseConfig;
use gradecast_core::model::SubmissionId;
use gradecast_core::traits::SubmissionModel;

/// Per-candidate offset keeping sort keys distinct when mean similarities
/// tie exactly. Far below any real similarity difference.
const TIE_EPSILON: f64 = 1e-7;

#[derive(Debug, Default)]
struct SelectionState {
    waiting: HashSet<SubmissionId>,
    handled: HashSet<SubmissionId>,
}

/// Picks which submissions a human should grade next so that propagated
/// knowledge grows fastest: low-coverage submissions that are
/// structurally close to many other ungraded submissions come first.
///
/// All bookkeeping lives on this object; one selector exists per
/// exercise.
pub struct SubmissionSelector {
    config: ExerciseConfig,
    state: Mutex<SelectionState>,
}

impl SubmissionSelector {
    pub fn new(config: ExerciseConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SelectionState::default()),
        }
    }

    /// Submissions currently waiting for a manual assessment, ascending.
    pub fn waiting(&self) -> Vec<SubmissionId> {
        let state = self.state.lock().unwrap();
        let mut waiting: Vec<SubmissionId> = state.waiting.iter().copied().collect();
        waiting.sort_unstable();
        waiting
    }

    /// Whether a submission was ever selected or externally marked done.
    pub fn is_handled(&self, submission: SubmissionId) -> bool {
        self.state.lock().unwrap().handled.contains(&submission)
    }

    /// Mark a submission's manual assessment as completed: it stops
    /// waiting and will not be selected again.
    pub fn mark_assessed(&self, submission: SubmissionId) {
        let mut state = self.state.lock().unwrap();
        state.waiting.remove(&submission);
        state.handled.insert(submission);
    }

    /// Release a submission entirely (e.g. an abandoned grading lock); it
    /// becomes eligible for selection again.
    pub fn release(&self, submission: SubmissionId) {
        let mut state = self.state.lock().unwrap();
        state.waiting.remove(&submission);
        state.handled.remove(&submission);
    }

    /// Select up to `count` submissions for manual grading.
    ///
    /// `coverages` holds the last computed coverage per submission;
    /// submissions without an entry are unknown to the scoring side and
    /// only reachable through the fallback. `is_unassessed` is the grading
    /// workflow's predicate for the fallback path, which returns at most
    /// one submission when the main path comes up empty — regardless of
    /// `count`.
    pub fn select_next(
        &self,
        count: usize,
        submissions: &[Arc<dyn SubmissionModel>],
        coverages: &HashMap<SubmissionId, f64>,
        is_unassessed: &dyn Fn(SubmissionId) -> bool,
    ) -> Vec<SubmissionId> {
        let mut state = self.state.lock().unwrap();

        let selected = self.select_by_similarity(&mut state, count, submissions, coverages);
        if !selected.is_empty() {
            return selected;
        }
        Self::select_fallback(&mut state, submissions, is_unassessed)
    }

    fn select_by_similarity(
        &self,
        state: &mut SelectionState,
        count: usize,
        submissions: &[Arc<dyn SubmissionModel>],
        coverages: &HashMap<SubmissionId, f64>,
    ) -> Vec<SubmissionId> {
        if count == 0 {
            return Vec::new();
        }

        let mut unhandled: Vec<&Arc<dyn SubmissionModel>> = submissions
            .iter()
            .filter(|s| !state.handled.contains(&s.id()) && coverages.contains_key(&s.id()))
            .collect();
        if unhandled.is_empty() {
            return Vec::new();
        }

        let coverage_of = |id: SubmissionId| coverages.get(&id).copied().unwrap_or(0.0);
        unhandled.sort_by(|a, b| coverage_of(a.id()).total_cmp(&coverage_of(b.id())));

        let window = self.window_size(&unhandled, &coverage_of);
        let candidates = &unhandled[..window];

        // Mean similarity of each candidate against the whole unhandled
        // set, bounded by the optional wall-clock budget.
        let deadline = (self.config.selection_timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(self.config.selection_timeout_ms));
        let mut ranked: Vec<(f64, SubmissionId)> = Vec::with_capacity(candidates.len());
        for (rank, candidate) in candidates.iter().enumerate() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        "selection budget exhausted after {rank} of {} candidates",
                        candidates.len()
                    );
                    break;
                }
            }
            let total: f64 = unhandled
                .iter()
                .map(|other| candidate.similarity_to(other.as_ref()))
                .sum();
            let mean = total / unhandled.len() as f64;
            ranked.push((mean + (rank as f64 + 1.0) * TIE_EPSILON, candidate.id()));
        }

        // Descending by adjusted similarity; the stable sort keeps
        // coverage-ascending order for keys that still compare equal.
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let selected: Vec<SubmissionId> = ranked
            .into_iter()
            .take(count)
            .map(|(_, id)| id)
            .collect();
        for id in &selected {
            state.handled.insert(*id);
            state.waiting.insert(*id);
        }
        selected
    }

    /// Candidate window over the coverage-ascending list: start small and
    /// grow while the coverage just past the boundary stays close to the
    /// minimum, up to the hard cap.
    fn window_size(
        &self,
        sorted: &[&Arc<dyn SubmissionModel>],
        coverage_of: &impl Fn(SubmissionId) -> f64,
    ) -> usize {
        let mut window = self.config.window_start.min(sorted.len());
        if window == 0 {
            return 0;
        }
        let min_coverage = coverage_of(sorted[0].id());
        while window + self.config.window_growth < sorted.len()
            && window < self.config.max_candidates
            && coverage_of(sorted[window].id()) - min_coverage <= self.config.window_margin
        {
            window += self.config.window_growth;
        }
        window.min(sorted.len()).min(self.config.max_candidates)
    }

    /// Scan the full submission collection and hand out the first one the
    /// workflow still considers unassessed.
    fn select_fallback(
        state: &mut SelectionState,
        submissions: &[Arc<dyn SubmissionModel>],
        is_unassessed: &dyn Fn(SubmissionId) -> bool,
    ) -> Vec<SubmissionId> {
        for submission in submissions {
            let id = submission.id();
            if is_unassessed(id) && !state.handled.contains(&id) {
                state.handled.insert(id);
                state.waiting.insert(id);
                tracing::debug!("fallback selected submission {id}");
                return vec![id];
            }
        }
        Vec::new()
    }
}
