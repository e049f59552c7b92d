use quarterdeck::core::broker::{Actor, DbBroker};
use quarterdeck::core::config::{self, Config};
use quarterdeck::core::db::{initialize_reporting_db, reporting_db_path};
use quarterdeck::core::store::Store;
use quarterdeck::engine::periods::PeriodType;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_initialize_is_idempotent() {
    let tmp = tempdir().unwrap();
    initialize_reporting_db(tmp.path()).unwrap();
    initialize_reporting_db(tmp.path()).unwrap();
    assert!(reporting_db_path(tmp.path()).exists());
}

#[test]
fn test_broker_audit_trail_records_actor() {
    let tmp = tempdir().unwrap();
    initialize_reporting_db(tmp.path()).unwrap();

    let broker = DbBroker::new(tmp.path());
    let actor = Actor {
        user_id: "u1".to_string(),
        role: "admin".to_string(),
        agency_id: "ag-7".to_string(),
    };
    broker
        .with_conn(&reporting_db_path(tmp.path()), &actor, "test.op", |_conn| {
            Ok(())
        })
        .unwrap();

    let log = std::fs::read_to_string(tmp.path().join("reporting.events.jsonl")).unwrap();
    let last = log.lines().last().unwrap();
    let event: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(event["op"], "test.op");
    assert_eq!(event["user_id"], "u1");
    assert_eq!(event["role"], "admin");
    assert_eq!(event["agency_id"], "ag-7");
    assert_eq!(event["status"], "success");
}

#[test]
fn test_broker_survives_unwritable_audit_log() {
    let tmp = tempdir().unwrap();
    initialize_reporting_db(tmp.path()).unwrap();

    // A directory squatting on the audit log path makes the append fail;
    // the operation itself must still report success.
    let log_path = tmp.path().join("reporting.events.jsonl");
    std::fs::remove_file(&log_path).ok();
    std::fs::create_dir(&log_path).unwrap();

    let broker = DbBroker::new(tmp.path());
    let result = broker.with_conn(
        &reporting_db_path(tmp.path()),
        &Actor::system(),
        "test.op",
        |conn| {
            conn.execute("INSERT INTO records(id, name, schema, data, created_at, updated_at) \
                          VALUES('r1', 'n', '{}', '{}', 't', 't')", [])?;
            Ok(())
        },
    );
    assert!(result.is_ok());
}

#[test]
fn test_config_defaults_when_missing() {
    let tmp = tempdir().unwrap();
    let config = config::load(tmp.path()).unwrap();
    assert_eq!(config.cadence, PeriodType::Quarterly);
    assert!(config.actor.user_id.is_none());
}

#[test]
fn test_config_scaffold_round_trips() {
    let tmp = tempdir().unwrap();
    config::write_default(tmp.path()).unwrap();
    assert!(tmp.path().join(config::CONFIG_FILE_NAME).exists());
    let config = config::load(tmp.path()).unwrap();
    assert_eq!(config.cadence, Config::default().cadence);
}

#[test]
fn test_config_parses_cadence_override() {
    let tmp = tempdir().unwrap();
    std::fs::write(
        tmp.path().join(config::CONFIG_FILE_NAME),
        "cadence = \"half_yearly\"\n",
    )
    .unwrap();
    let config = config::load(tmp.path()).unwrap();
    assert_eq!(config.cadence, PeriodType::HalfYearly);
}

#[test]
fn test_store_resolve_prefers_explicit_dir() {
    let store = Store::resolve(Some(PathBuf::from("/tmp/explicit")));
    assert_eq!(store.root, PathBuf::from("/tmp/explicit"));
}
