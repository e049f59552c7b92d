use chrono::{DateTime, TimeZone, Utc};
use quarterdeck::core::broker::Actor;
use quarterdeck::core::db::initialize_reporting_db;
use quarterdeck::core::store::Store;
use quarterdeck::engine::history::{field_history, timeline_entries};
use quarterdeck::engine::periods::{ensure_current_period, PeriodType};
use quarterdeck::engine::submissions::{create_draft, get_history};
use serde_json::json;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, Actor) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().to_path_buf());
    initialize_reporting_db(&store.root).unwrap();
    (tmp, store, Actor::system())
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

#[test]
fn test_field_history_from_stored_timeline() {
    let (_tmp, store, actor) = setup();
    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 1)).unwrap();
    let q3 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 8, 1)).unwrap();

    create_draft(&store, &actor, "prog-1", &q1.id, &json!({ "target": "A" })).unwrap();
    create_draft(&store, &actor, "prog-1", &q2.id, &json!({ "target": "A" })).unwrap();
    create_draft(&store, &actor, "prog-1", &q3.id, &json!({ "target": "B" })).unwrap();

    let timeline = get_history(&store, &actor, "prog-1").unwrap();
    let changes = field_history(&timeline_entries(&timeline), "target");

    let labels: Vec<&str> = changes.iter().map(|c| c.period_label.as_str()).collect();
    assert_eq!(labels, vec!["Q1 2026", "Q2 2026", "Q3 2026"]);
    let changed: Vec<bool> = changes.iter().map(|c| c.changed_from_previous).collect();
    assert_eq!(changed, vec![true, false, true]);
}

#[test]
fn test_single_submission_yields_empty_timeline() {
    let (_tmp, store, actor) = setup();
    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    create_draft(&store, &actor, "prog-1", &q1.id, &json!({ "target": "A" })).unwrap();

    let timeline = get_history(&store, &actor, "prog-1").unwrap();
    assert!(field_history(&timeline_entries(&timeline), "target").is_empty());
}

#[test]
fn test_structural_equality_ignores_document_identity() {
    let (_tmp, store, actor) = setup();
    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 1)).unwrap();

    // Different documents carrying the same trimmed value for the field.
    create_draft(
        &store,
        &actor,
        "prog-1",
        &q1.id,
        &json!({ "target": "A", "note": "first" }),
    )
    .unwrap();
    create_draft(
        &store,
        &actor,
        "prog-1",
        &q2.id,
        &json!({ "note": "second", "target": " A " }),
    )
    .unwrap();

    let timeline = get_history(&store, &actor, "prog-1").unwrap();
    let changes = field_history(&timeline_entries(&timeline), "target");
    assert_eq!(changes.len(), 2);
    assert!(changes[0].changed_from_previous);
    assert!(!changes[1].changed_from_previous);
}

#[test]
fn test_absent_field_is_null_not_an_error() {
    let (_tmp, store, actor) = setup();
    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 1)).unwrap();

    create_draft(&store, &actor, "prog-1", &q1.id, &json!({ "other": 1 })).unwrap();
    create_draft(&store, &actor, "prog-1", &q2.id, &json!({ "target": "B" })).unwrap();

    let timeline = get_history(&store, &actor, "prog-1").unwrap();
    let changes = field_history(&timeline_entries(&timeline), "target");
    assert!(changes[0].value.is_null());
    assert!(changes[1].changed_from_previous);
}
