use chrono::{DateTime, TimeZone, Utc};
use quarterdeck::core::broker::Actor;
use quarterdeck::core::db::initialize_reporting_db;
use quarterdeck::core::error::QuarterdeckError;
use quarterdeck::core::store::Store;
use quarterdeck::engine::periods::{ensure_current_period, PeriodType};
use quarterdeck::engine::submissions::{
    create_draft, finalize, get_history, get_submission, reopen, update_draft, DraftState,
};
use serde_json::json;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, Actor) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().to_path_buf());
    initialize_reporting_db(&store.root).unwrap();
    let actor = Actor {
        user_id: "reporter".to_string(),
        role: "agency_user".to_string(),
        agency_id: "agency-9".to_string(),
    };
    (tmp, store, actor)
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

#[test]
fn test_draft_lifecycle() {
    let (_tmp, store, actor) = setup();
    let period = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();

    // Create: draft, owned by the actor's agency, not yet submitted.
    let draft = create_draft(&store, &actor, "prog-1", &period.id, &json!({ "target": "A" })).unwrap();
    assert_eq!(draft.state, DraftState::Draft);
    assert_eq!(draft.agency_id, "agency-9");
    assert!(draft.submitted_at.is_none());

    // Drafts are mutated in place.
    let updated = update_draft(&store, &actor, &draft.id, &json!({ "target": "B" })).unwrap();
    assert_eq!(updated.content["target"], "B");

    // Finalize flips the flag and stamps the submission time.
    let finalized = finalize(&store, &actor, &draft.id).unwrap();
    assert_eq!(finalized.state, DraftState::Final);
    assert!(finalized.submitted_at.is_some());

    // Finalized submissions are immutable except via explicit reopen.
    let err = update_draft(&store, &actor, &draft.id, &json!({})).unwrap_err();
    assert!(matches!(err, QuarterdeckError::NotDraft(_)));
    let err = finalize(&store, &actor, &draft.id).unwrap_err();
    assert!(matches!(err, QuarterdeckError::AlreadyFinal(_)));

    // Reopen restores draft state; content survives.
    let reopened = reopen(&store, &actor, &draft.id).unwrap();
    assert_eq!(reopened.state, DraftState::Draft);
    assert_eq!(reopened.content["target"], "B");
    let err = reopen(&store, &actor, &draft.id).unwrap_err();
    assert!(matches!(err, QuarterdeckError::AlreadyDraft(_)));

    // Editable again after reopen.
    update_draft(&store, &actor, &draft.id, &json!({ "target": "C" })).unwrap();
}

#[test]
fn test_duplicate_draft_is_rejected_and_single_row_survives() {
    let (_tmp, store, actor) = setup();
    let period = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();

    create_draft(&store, &actor, "prog-1", &period.id, &json!({})).unwrap();
    let err = create_draft(&store, &actor, "prog-1", &period.id, &json!({})).unwrap_err();
    assert!(matches!(
        err,
        QuarterdeckError::DuplicateSubmission { ref program_id, ref period_id }
            if program_id == "prog-1" && period_id == &period.id
    ));

    let history = get_history(&store, &actor, "prog-1").unwrap();
    assert_eq!(history.len(), 1);
}

#[test]
fn test_create_against_unknown_period_is_not_found() {
    let (_tmp, store, actor) = setup();
    let err = create_draft(&store, &actor, "prog-1", "nope", &json!({})).unwrap_err();
    assert!(matches!(err, QuarterdeckError::NotFound(_)));
}

#[test]
fn test_unknown_submission_is_not_found() {
    let (_tmp, store, actor) = setup();
    let err = update_draft(&store, &actor, "nope", &json!({})).unwrap_err();
    assert!(matches!(err, QuarterdeckError::NotFound(_)));
    let err = get_submission(&store, &actor, "nope").unwrap_err();
    assert!(matches!(err, QuarterdeckError::NotFound(_)));
}

#[test]
fn test_history_is_ordered_by_period_with_skips_absent() {
    let (_tmp, store, actor) = setup();
    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 1)).unwrap();
    let q4 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 11, 1)).unwrap();

    // Created out of chronological order; the program skipped Q3 entirely.
    create_draft(&store, &actor, "prog-1", &q4.id, &json!({ "n": 4 })).unwrap();
    create_draft(&store, &actor, "prog-1", &q1.id, &json!({ "n": 1 })).unwrap();
    create_draft(&store, &actor, "prog-1", &q2.id, &json!({ "n": 2 })).unwrap();

    let history = get_history(&store, &actor, "prog-1").unwrap();
    let labels: Vec<&str> = history.iter().map(|h| h.period_label.as_str()).collect();
    assert_eq!(labels, vec!["Q1 2026", "Q2 2026", "Q4 2026"]);
    let values: Vec<i64> = history
        .iter()
        .map(|h| h.submission.content["n"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 4]);
}

#[test]
fn test_content_round_trips_as_structured_document() {
    let (_tmp, store, actor) = setup();
    let period = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let content = json!({
        "target": "Reduce wait times",
        "metrics": { "baseline": 12.5, "goal": 8 },
        "tags": ["ops", "priority"]
    });
    let draft = create_draft(&store, &actor, "prog-1", &period.id, &content).unwrap();
    let fetched = get_submission(&store, &actor, &draft.id).unwrap();
    assert_eq!(fetched.content, content);
}
