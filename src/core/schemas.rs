//! Centralized schema definitions for the reporting database.
//!
//! Quarterdeck keeps all durable state in one SQLite database, `reporting.db`:
//! 1. periods: the reporting-period timeline (globally shared).
//! 2. submissions: one versioned content row per (program, period).
//! 3. records: flexible tabular records (schema + data blobs, always paired).
//!
//! The uniqueness constraints here are load-bearing: they are the arbiters
//! that resolve concurrent writers to exactly one winner (see the periods
//! and submissions engine modules).

pub const REPORTING_DB_NAME: &str = "reporting.db";
pub const REPORTING_EVENTS_NAME: &str = "reporting.events.jsonl";

pub const PERIODS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS periods (
        id TEXT PRIMARY KEY,
        year INTEGER NOT NULL,
        period_type TEXT NOT NULL,
        period_number INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'open',
        starts_at TEXT NOT NULL,
        ends_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(year, period_type, period_number)
    )
";

// At most one period may be open system-wide.
pub const PERIODS_SINGLE_OPEN_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_periods_single_open ON periods(status) WHERE status = 'open'";

pub const SUBMISSIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS submissions (
        id TEXT PRIMARY KEY,
        program_id TEXT NOT NULL,
        period_id TEXT NOT NULL,
        agency_id TEXT NOT NULL,
        content TEXT NOT NULL,
        draft INTEGER NOT NULL DEFAULT 1,
        submitted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(program_id, period_id),
        FOREIGN KEY(period_id) REFERENCES periods(id)
    )
";

pub const SUBMISSIONS_PROGRAM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_submissions_program ON submissions(program_id)";

pub const RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        schema TEXT NOT NULL, -- JSON: ordered column/row descriptors
        data TEXT NOT NULL,   -- JSON: row-id -> column-id -> number|null
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
