//! End-to-end flow: submit, grade a little, propagate, score, select.

use std::collections::BTreeMap;
use std::sync::Arc;

use gradecast_core::config::ExerciseConfig;
use gradecast_core::memory::{SimilarityTable, StubElement, StubSubmission};
use gradecast_core::model::{Feedback, FeedbackOrigin, SubmissionId};
use gradecast_core::traits::SubmissionModel;
use gradecast_engine::engine::ExerciseEngine;

fn submission(
    id: SubmissionId,
    element_ids: &[&str],
    table: &Arc<SimilarityTable>,
) -> Arc<dyn SubmissionModel> {
    let mut submission = StubSubmission::new(id, Arc::clone(table));
    for element_id in element_ids {
        submission =
            submission.with_element(StubElement::new(*element_id, "class", Arc::clone(table)));
    }
    Arc::new(submission)
}

/// Three structurally similar submissions. Grading the first covers the
/// others through their shared equivalence classes, and the selector then
/// prefers whatever is still uncovered.
#[tokio::test]
async fn feedback_propagates_across_equivalent_submissions() {
    let table = Arc::new(SimilarityTable::new());
    // Submissions 1 and 2 share both elements, submission 3 only one.
    table.set("person-1", "person-2", 0.9);
    table.set("person-1", "person-3", 0.9);
    table.set("address-1", "address-2", 0.85);

    let config = ExerciseConfig {
        equality_threshold: 0.8,
        confidence_threshold: 0.5,
        ..ExerciseConfig::default()
    };
    let engine = ExerciseEngine::in_memory(config).unwrap();

    engine
        .submit(submission(1, &["person-1", "address-1"], &table))
        .await
        .unwrap();
    engine
        .submit(submission(2, &["person-2", "address-2"], &table))
        .await
        .unwrap();
    engine
        .submit(submission(3, &["person-3", "extra-3"], &table))
        .await
        .unwrap();

    // A human grades submission 1.
    let manual: BTreeMap<String, Feedback> = [
        (
            "person-1".to_string(),
            Feedback::manual(1.0).with_comment("entity correctly named"),
        ),
        ("address-1".to_string(), Feedback::manual(0.5)),
    ]
    .into();
    assert_eq!(engine.propagate(1, &manual).await.unwrap(), 2);

    // Submission 2 is fully covered by propagation.
    let second = engine.score_submission(2).await.unwrap();
    assert!((second.coverage - 1.0).abs() < f64::EPSILON);
    let person = &second.scores["person-2"];
    assert_eq!(person.origin, FeedbackOrigin::Propagated);
    assert!((person.credit - 1.0).abs() < f64::EPSILON);
    assert_eq!(person.comment.as_deref(), Some("entity correctly named"));

    // Submission 3 shares only the person element.
    let third = engine.score_submission(3).await.unwrap();
    assert!((third.coverage - 0.5).abs() < f64::EPSILON);
    assert!(!third.scores.contains_key("extra-3"));

    let exercise = engine.score_exercise().await.unwrap();
    assert_eq!(exercise.submission_count, 3);
    assert!((exercise.mean_coverage - (1.0 + 1.0 + 0.5) / 3.0).abs() < 1e-12);

    let stats = engine.statistics().await.unwrap();
    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.classes, 3);
    assert_eq!(stats.assessed_classes, 2);
    assert_eq!(stats.feedback_items, 2);
}

#[tokio::test]
async fn selector_prefers_central_low_coverage_submissions() {
    let table = Arc::new(SimilarityTable::new());
    table.set("person-1", "person-2", 0.9);
    // Submission-level similarity: 3 sits closest to the rest of the
    // ungraded pool.
    table.set(StubSubmission::label(3), StubSubmission::label(4), 0.9);
    table.set(StubSubmission::label(3), StubSubmission::label(2), 0.3);
    table.set(StubSubmission::label(4), StubSubmission::label(2), 0.1);

    let config = ExerciseConfig {
        equality_threshold: 0.8,
        confidence_threshold: 0.5,
        ..ExerciseConfig::default()
    };
    let engine = ExerciseEngine::in_memory(config).unwrap();

    engine
        .submit(submission(1, &["person-1"], &table))
        .await
        .unwrap();
    engine
        .submit(submission(2, &["person-2", "extra-2"], &table))
        .await
        .unwrap();
    engine
        .submit(submission(3, &["lone-3"], &table))
        .await
        .unwrap();
    engine
        .submit(submission(4, &["lone-4"], &table))
        .await
        .unwrap();

    let manual: BTreeMap<String, Feedback> =
        [("person-1".to_string(), Feedback::manual(1.0))].into();
    engine.propagate(1, &manual).await.unwrap();
    engine.mark_assessed(1);

    // Remaining coverages: submission 2 → 0.5, submissions 3 and 4 → 0.0.
    // Submission 3 is both uncovered and closest to the remaining pool.
    let picked = engine.select_next(1, &|_| true).await.unwrap();
    assert_eq!(picked, vec![3]);
    assert_eq!(engine.waiting(), vec![3]);

    // The next batch hands out the rest without repeating submission 3.
    let next = engine.select_next(2, &|_| true).await.unwrap();
    assert_eq!(next, vec![2, 4]);

    // Releasing makes a submission selectable once more.
    engine.release(3);
    let again = engine.select_next(1, &|_| true).await.unwrap();
    assert_eq!(again, vec![3]);
}

#[tokio::test]
async fn malformed_elements_never_block_an_exercise() {
    let table = Arc::new(SimilarityTable::new());
    table.set("ok-1", "ok-2", f64::NAN);

    let engine = ExerciseEngine::in_memory(ExerciseConfig::default()).unwrap();
    engine.submit(submission(1, &["ok-1"], &table)).await.unwrap();
    engine.submit(submission(2, &["ok-2"], &table)).await.unwrap();

    // The NaN comparison degrades to non-matching: two classes, no error.
    let stats = engine.statistics().await.unwrap();
    assert_eq!(stats.classes, 2);
}
