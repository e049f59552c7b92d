//! Period Manager: owns the reporting-period timeline.
//!
//! Periods are time-boxed windows (quarters or half-years) numbered
//! sequentially within a year: 1-4 for quarterly, 5-6 for half-yearly.
//! Exactly one period is open system-wide at any time; transitions close the
//! current period and insert its successors inside one transaction. The
//! `UNIQUE(year, period_type, period_number)` constraint is the arbiter for
//! concurrent callers, and a conflicting *closed* row is a sequencing fault
//! that is surfaced, never overwritten.

use crate::core::broker::{Actor, DbBroker};
use crate::core::db;
use crate::core::error::QuarterdeckError;
use crate::core::store::Store;
use crate::core::time;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use clap::ValueEnum;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Quarterly,
    HalfYearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::HalfYearly => "half_yearly",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, QuarterdeckError> {
        match raw {
            "quarterly" => Ok(Self::Quarterly),
            "half_yearly" => Ok(Self::HalfYearly),
            other => Err(QuarterdeckError::Validation(format!(
                "unknown period type: {other}"
            ))),
        }
    }

    /// First period number of a year for this cadence.
    pub fn first_number(&self) -> i64 {
        match self {
            Self::Quarterly => 1,
            Self::HalfYearly => 5,
        }
    }

    /// Last period number of a year for this cadence.
    pub fn last_number(&self) -> i64 {
        match self {
            Self::Quarterly => 4,
            Self::HalfYearly => 6,
        }
    }

    fn months(&self) -> i64 {
        match self {
            Self::Quarterly => 3,
            Self::HalfYearly => 6,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, QuarterdeckError> {
        match raw {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(QuarterdeckError::Validation(format!(
                "unknown period status: {other}"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportingPeriod {
    pub id: String,
    pub year: i64,
    pub period_type: PeriodType,
    pub period_number: i64,
    pub status: PeriodStatus,
    pub starts_at: String,
    pub ends_at: String,
    pub created_at: String,
}

impl ReportingPeriod {
    pub fn label(&self) -> Result<String, QuarterdeckError> {
        period_label(self.period_number, self.year)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PeriodFilter {
    pub year: Option<i64>,
    pub period_type: Option<PeriodType>,
    pub status: Option<PeriodStatus>,
}

/// Maps a stored period number to its display label.
pub fn period_label(period_number: i64, year: i64) -> Result<String, QuarterdeckError> {
    match period_number {
        1..=4 => Ok(format!("Q{} {}", period_number, year)),
        5 => Ok(format!("Half Yearly 1 {}", year)),
        6 => Ok(format!("Half Yearly 2 {}", year)),
        other => Err(QuarterdeckError::InvalidPeriodEncoding(other)),
    }
}

/// Half-open `[start, end)` window for a (year, number) pair. Windows within
/// a year are contiguous: each ends exactly where its successor starts.
pub fn period_window(
    period_type: PeriodType,
    year: i64,
    number: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>), QuarterdeckError> {
    let start_month = match (period_type, number) {
        (PeriodType::Quarterly, 1..=4) => (number - 1) * 3 + 1,
        (PeriodType::HalfYearly, 5) => 1,
        (PeriodType::HalfYearly, 6) => 7,
        (_, other) => return Err(QuarterdeckError::InvalidPeriodEncoding(other)),
    };
    let end_month = start_month + period_type.months();
    let start = month_start(year, start_month)?;
    let end = if end_month > 12 {
        month_start(year + 1, end_month - 12)?
    } else {
        month_start(year, end_month)?
    };
    Ok((start, end))
}

fn month_start(year: i64, month: i64) -> Result<DateTime<Utc>, QuarterdeckError> {
    Utc.with_ymd_and_hms(year as i32, month as u32, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| {
            QuarterdeckError::PeriodSequencing(format!("invalid period boundary {year}-{month:02}"))
        })
}

/// Next (year, number) in sequence: same year, number + 1, until the last
/// number of the year for the cadence, then next year at the first number.
pub fn successor(period_type: PeriodType, year: i64, number: i64) -> (i64, i64) {
    if number >= period_type.last_number() {
        (year + 1, period_type.first_number())
    } else {
        (year, number + 1)
    }
}

/// The (year, number) whose calendar window contains `now`. Used only to
/// bootstrap an empty timeline; afterwards numbering advances sequentially.
fn calendar_position(period_type: PeriodType, now: DateTime<Utc>) -> (i64, i64) {
    let year = i64::from(now.year());
    let month = i64::from(now.month());
    let number = match period_type {
        PeriodType::Quarterly => (month - 1) / 3 + 1,
        PeriodType::HalfYearly => {
            if month <= 6 {
                5
            } else {
                6
            }
        }
    };
    (year, number)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, QuarterdeckError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QuarterdeckError::Validation(format!("bad timestamp '{raw}': {e}")))
}

fn covers(period: &ReportingPeriod, now: DateTime<Utc>) -> Result<bool, QuarterdeckError> {
    let starts = parse_ts(&period.starts_at)?;
    let ends = parse_ts(&period.ends_at)?;
    Ok(starts <= now && now < ends)
}

/// Idempotently guarantees exactly one open period covering `now`.
///
/// If the open period already covers `now` it is returned unchanged.
/// Otherwise the open period is closed and successors are inserted in
/// sequence (interim windows land already closed) until the window covering
/// `now` is reached, all in one transaction. Switching cadence hands the
/// open slot over: the other cadence's period is closed and the requested
/// cadence's row covering `now` is reopened if it already exists. A
/// conflicting row that is open and current is a concurrent winner and is
/// returned; any other conflict is a `PeriodSequencing` fault requiring
/// manual reconciliation.
pub fn ensure_current_period(
    store: &Store,
    actor: &Actor,
    period_type: PeriodType,
    now: DateTime<Utc>,
) -> Result<ReportingPeriod, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "period.ensure", |conn| {
        let tx = conn.unchecked_transaction()?;

        let mut switched_cadence = false;
        if let Some(open) = open_period(&tx)? {
            if open.period_type == period_type && covers(&open, now)? {
                tx.commit()?;
                return Ok(open);
            }
            switched_cadence = open.period_type != period_type;
            close_period(&tx, &open.id)?;
        }

        let mut cursor = match latest_period(&tx, period_type)? {
            Some(last) => successor(period_type, last.year, last.period_number),
            None => calendar_position(period_type, now),
        };

        loop {
            let (year, number) = cursor;
            let (starts, ends) = period_window(period_type, year, number)?;
            if now < starts {
                // The requested cadence already reached the current window
                // before another cadence took the open slot. Reopen its row
                // covering `now`; with no cadence handover a future-dated
                // timeline is a fault, not something to paper over.
                if switched_cadence {
                    let (cal_year, cal_number) = calendar_position(period_type, now);
                    if let Some(existing) = get_by_key(&tx, period_type, cal_year, cal_number)? {
                        if covers(&existing, now)? {
                            reopen_period(&tx, &existing.id)?;
                            tx.commit()?;
                            return Ok(ReportingPeriod {
                                status: PeriodStatus::Open,
                                ..existing
                            });
                        }
                    }
                }
                return Err(QuarterdeckError::PeriodSequencing(format!(
                    "next period in sequence ({} {} of {}) starts at {} which is after now ({}); \
                     the timeline is ahead of the clock",
                    period_type.as_str(),
                    number,
                    year,
                    time::to_rfc3339(starts),
                    time::to_rfc3339(now),
                )));
            }
            let is_current = now < ends;
            let status = if is_current {
                PeriodStatus::Open
            } else {
                PeriodStatus::Closed
            };
            let period = insert_period(&tx, period_type, year, number, status, starts, ends)?;
            if is_current {
                tx.commit()?;
                return Ok(period);
            }
            cursor = successor(period_type, year, number);
        }
    })
}

/// Lists periods ordered by (year, period_number) ascending.
pub fn list_periods(
    store: &Store,
    actor: &Actor,
    filter: &PeriodFilter,
) -> Result<Vec<ReportingPeriod>, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "period.list", |conn| {
        let mut sql = format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(year) = filter.year {
            sql.push_str(" AND year = ?");
            args.push(Box::new(year));
        }
        if let Some(period_type) = filter.period_type {
            sql.push_str(" AND period_type = ?");
            args.push(Box::new(period_type.as_str()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY year ASC, period_number ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| &**a)),
            period_row,
        )?;
        let mut periods = Vec::new();
        for row in rows {
            periods.push(period_from_parts(row?)?);
        }
        Ok(periods)
    })
}

pub fn get_period(store: &Store, actor: &Actor, id: &str) -> Result<ReportingPeriod, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "period.get", |conn| {
        let parts = conn
            .query_row(
                &format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE id = ?1"),
                params![id],
                period_row,
            )
            .optional()?;
        match parts {
            Some(parts) => period_from_parts(parts),
            None => Err(QuarterdeckError::NotFound(format!("period {id}"))),
        }
    })
}

const PERIOD_COLUMNS: &str =
    "id, year, period_type, period_number, status, starts_at, ends_at, created_at";

type PeriodParts = (String, i64, String, i64, String, String, String, String);

fn period_row(row: &rusqlite::Row) -> rusqlite::Result<PeriodParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn period_from_parts(parts: PeriodParts) -> Result<ReportingPeriod, QuarterdeckError> {
    Ok(ReportingPeriod {
        id: parts.0,
        year: parts.1,
        period_type: PeriodType::parse(&parts.2)?,
        period_number: parts.3,
        status: PeriodStatus::parse(&parts.4)?,
        starts_at: parts.5,
        ends_at: parts.6,
        created_at: parts.7,
    })
}

fn open_period(conn: &Connection) -> Result<Option<ReportingPeriod>, QuarterdeckError> {
    let parts = conn
        .query_row(
            &format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE status = 'open'"),
            [],
            period_row,
        )
        .optional()?;
    parts.map(period_from_parts).transpose()
}

fn latest_period(
    conn: &Connection,
    period_type: PeriodType,
) -> Result<Option<ReportingPeriod>, QuarterdeckError> {
    let parts = conn
        .query_row(
            &format!(
                "SELECT {PERIOD_COLUMNS} FROM periods WHERE period_type = ?1 \
                 ORDER BY year DESC, period_number DESC LIMIT 1"
            ),
            params![period_type.as_str()],
            period_row,
        )
        .optional()?;
    parts.map(period_from_parts).transpose()
}

fn close_period(conn: &Connection, id: &str) -> Result<(), QuarterdeckError> {
    conn.execute(
        "UPDATE periods SET status = 'closed' WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

fn reopen_period(conn: &Connection, id: &str) -> Result<(), QuarterdeckError> {
    conn.execute(
        "UPDATE periods SET status = 'open' WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

fn get_by_key(
    conn: &Connection,
    period_type: PeriodType,
    year: i64,
    number: i64,
) -> Result<Option<ReportingPeriod>, QuarterdeckError> {
    let parts = conn
        .query_row(
            &format!(
                "SELECT {PERIOD_COLUMNS} FROM periods \
                 WHERE year = ?1 AND period_type = ?2 AND period_number = ?3"
            ),
            params![year, period_type.as_str(), number],
            period_row,
        )
        .optional()?;
    parts.map(period_from_parts).transpose()
}

fn insert_period(
    conn: &Connection,
    period_type: PeriodType,
    year: i64,
    number: i64,
    status: PeriodStatus,
    starts: DateTime<Utc>,
    ends: DateTime<Utc>,
) -> Result<ReportingPeriod, QuarterdeckError> {
    let period = ReportingPeriod {
        id: time::new_id(),
        year,
        period_type,
        period_number: number,
        status,
        starts_at: time::to_rfc3339(starts),
        ends_at: time::to_rfc3339(ends),
        created_at: time::now_rfc3339(),
    };
    let result = conn.execute(
        "INSERT INTO periods(id, year, period_type, period_number, status, starts_at, ends_at, created_at) \
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            period.id,
            period.year,
            period.period_type.as_str(),
            period.period_number,
            period.status.as_str(),
            period.starts_at,
            period.ends_at,
            period.created_at,
        ],
    );
    match result {
        Ok(_) => Ok(period),
        Err(err) if is_unique_violation(&err) => {
            // The (year, type, number) slot is already taken. A row left by
            // a concurrent caller in the same state is the winner and is
            // returned as-is; anything else is a corrupted timeline.
            let existing = get_by_key(conn, period_type, year, number)?
                .ok_or(QuarterdeckError::Rusqlite(err))?;
            if existing.status == status {
                Ok(existing)
            } else {
                Err(QuarterdeckError::PeriodSequencing(format!(
                    "period {} {} of {} already exists with status '{}'; refusing to overwrite",
                    period_type.as_str(),
                    number,
                    year,
                    existing.status.as_str(),
                )))
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
