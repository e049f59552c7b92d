use crate::core::broker::{Actor, DbBroker};
use crate::core::error::QuarterdeckError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &Path) -> Result<Connection, QuarterdeckError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn reporting_db_path(root: &Path) -> PathBuf {
    root.join(schemas::REPORTING_DB_NAME)
}

/// Idempotently creates the reporting database and its tables.
pub fn initialize_reporting_db(root: &Path) -> Result<(), QuarterdeckError> {
    fs::create_dir_all(root)?;
    let db_path = reporting_db_path(root);

    let broker = DbBroker::new(root);
    broker.with_conn(&db_path, &Actor::system(), "db.init", |conn| {
        conn.execute(schemas::PERIODS_SCHEMA, [])?;
        conn.execute(schemas::PERIODS_SINGLE_OPEN_INDEX, [])?;
        conn.execute(schemas::SUBMISSIONS_SCHEMA, [])?;
        conn.execute(schemas::SUBMISSIONS_PROGRAM_INDEX, [])?;
        conn.execute(schemas::RECORDS_SCHEMA, [])?;
        Ok(())
    })
}
