use chrono::{DateTime, TimeZone, Utc};
use quarterdeck::core::broker::Actor;
use quarterdeck::core::db::{initialize_reporting_db, reporting_db_path};
use quarterdeck::core::error::QuarterdeckError;
use quarterdeck::core::store::Store;
use quarterdeck::engine::periods::{
    ensure_current_period, list_periods, PeriodFilter, PeriodStatus, PeriodType,
};
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

fn open_periods(store: &Store, actor: &Actor) -> Vec<quarterdeck::engine::periods::ReportingPeriod> {
    let filter = PeriodFilter {
        status: Some(PeriodStatus::Open),
        ..PeriodFilter::default()
    };
    list_periods(store, actor, &filter).unwrap()
}

#[test]
fn test_ensure_is_idempotent() {
    let (_tmp, store, actor) = setup();
    let now = at(2026, 5, 10);
    let first = ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap();
    let second = ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.period_number, 2);
    assert_eq!(first.label().unwrap(), "Q2 2026");
    assert_eq!(open_periods(&store, &actor).len(), 1);
}

#[test]
fn test_transition_closes_old_and_opens_next() {
    let (_tmp, store, actor) = setup();
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 10)).unwrap();
    let q3 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 8, 1)).unwrap();
    assert_eq!(q3.period_number, 3);

    let open = open_periods(&store, &actor);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, q3.id);

    let all = list_periods(&store, &actor, &PeriodFilter::default()).unwrap();
    let old = all.iter().find(|p| p.id == q2.id).unwrap();
    assert_eq!(old.status, PeriodStatus::Closed);
}

#[test]
fn test_skipped_windows_are_backfilled_without_gaps() {
    let (_tmp, store, actor) = setup();
    ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 2, 1)).unwrap();
    let q4 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 11, 5)).unwrap();
    assert_eq!(q4.period_number, 4);

    let all = list_periods(&store, &actor, &PeriodFilter::default()).unwrap();
    let numbers: Vec<i64> = all.iter().map(|p| p.period_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(open_periods(&store, &actor).len(), 1);
}

#[test]
fn test_year_rollover_resets_numbering() {
    let (_tmp, store, actor) = setup();
    let q4 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 11, 1)).unwrap();
    assert_eq!((q4.year, q4.period_number), (2026, 4));

    let q1 = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2027, 2, 1)).unwrap();
    assert_eq!((q1.year, q1.period_number), (2027, 1));
    assert_eq!(q1.label().unwrap(), "Q1 2027");
}

#[test]
fn test_half_yearly_sequence_and_labels() {
    let (_tmp, store, actor) = setup();
    let h1 = ensure_current_period(&store, &actor, PeriodType::HalfYearly, at(2026, 3, 1)).unwrap();
    assert_eq!(h1.period_number, 5);
    assert_eq!(h1.label().unwrap(), "Half Yearly 1 2026");

    let h2 = ensure_current_period(&store, &actor, PeriodType::HalfYearly, at(2026, 9, 1)).unwrap();
    assert_eq!(h2.period_number, 6);
    assert_eq!(h2.label().unwrap(), "Half Yearly 2 2026");

    let next = ensure_current_period(&store, &actor, PeriodType::HalfYearly, at(2027, 1, 15)).unwrap();
    assert_eq!((next.year, next.period_number), (2027, 5));
}

#[test]
fn test_cadence_switch_back_reopens_current_window() {
    let (_tmp, store, actor) = setup();
    let now = at(2026, 5, 10);
    let q2 = ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap();
    let h1 = ensure_current_period(&store, &actor, PeriodType::HalfYearly, now).unwrap();
    assert_eq!(h1.period_number, 5);

    // Switching back must hand the open slot to the quarterly row covering
    // now, not fail as a sequencing fault.
    let back = ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap();
    assert_eq!(back.id, q2.id);
    assert_eq!(back.status, PeriodStatus::Open);

    let open = open_periods(&store, &actor);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, q2.id);

    let all = list_periods(&store, &actor, &PeriodFilter::default()).unwrap();
    let half = all.iter().find(|p| p.id == h1.id).unwrap();
    assert_eq!(half.status, PeriodStatus::Closed);
}

#[test]
fn test_closed_current_window_is_a_sequencing_fault() {
    let (_tmp, store, actor) = setup();
    let now = at(2026, 5, 10);
    ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap();

    // An operator (or a bug) closed the current period without opening a
    // successor. The engine must refuse to paper over it.
    let conn = rusqlite::Connection::open(reporting_db_path(&store.root)).unwrap();
    conn.execute("UPDATE periods SET status = 'closed'", []).unwrap();
    drop(conn);

    let err = ensure_current_period(&store, &actor, PeriodType::Quarterly, now).unwrap_err();
    assert!(matches!(&err, QuarterdeckError::PeriodSequencing(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_existing_conflicting_row_is_never_overwritten() {
    let (_tmp, store, actor) = setup();
    ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 5, 10)).unwrap();

    // Simulate a corrupted timeline: the successor slot is already occupied
    // by a closed row.
    let conn = rusqlite::Connection::open(reporting_db_path(&store.root)).unwrap();
    conn.execute(
        "INSERT INTO periods(id, year, period_type, period_number, status, starts_at, ends_at, created_at) \
         VALUES('manual', 2026, 'quarterly', 3, 'closed', '2026-07-01T00:00:00Z', '2026-10-01T00:00:00Z', '2026-07-01T00:00:00Z')",
        [],
    )
    .unwrap();
    drop(conn);

    let err = ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 8, 1)).unwrap_err();
    assert!(matches!(err, QuarterdeckError::PeriodSequencing(_)));

    let all = list_periods(&store, &actor, &PeriodFilter::default()).unwrap();
    let q3 = all.iter().find(|p| p.period_number == 3).unwrap();
    assert_eq!(q3.id, "manual");
}

#[test]
fn test_list_filters_by_year_and_status() {
    let (_tmp, store, actor) = setup();
    ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2026, 11, 1)).unwrap();
    ensure_current_period(&store, &actor, PeriodType::Quarterly, at(2027, 2, 1)).unwrap();

    let filter = PeriodFilter {
        year: Some(2027),
        ..PeriodFilter::default()
    };
    let for_2027 = list_periods(&store, &actor, &filter).unwrap();
    assert_eq!(for_2027.len(), 1);
    assert_eq!(for_2027[0].period_number, 1);

    let filter = PeriodFilter {
        status: Some(PeriodStatus::Closed),
        ..PeriodFilter::default()
    };
    let closed = list_periods(&store, &actor, &filter).unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].year, 2026);
}
