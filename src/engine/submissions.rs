//! Submission Store: versioned program content per reporting period.
//!
//! A program has at most one submission row per period, mutated in place
//! while still a draft. Finalizing flips the draft flag; it never appends a
//! new row, so a program's history across periods is exactly its ordered set
//! of one-submission-per-period rows. Status is derived from the draft flag
//! alone, never from payload content.
//!
//! Content payloads are opaque structured documents here; field semantics
//! belong to the history reconstructor.

use crate::core::broker::{Actor, DbBroker};
use crate::core::db;
use crate::core::error::QuarterdeckError;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::periods;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    Draft,
    Final,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub program_id: String,
    pub period_id: String,
    pub agency_id: String,
    pub content: JsonValue,
    pub state: DraftState,
    pub submitted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Submission {
    pub fn is_draft(&self) -> bool {
        self.state == DraftState::Draft
    }
}

/// A submission joined with its owning period, as returned by `get_history`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionWithPeriod {
    pub submission: Submission,
    pub year: i64,
    pub period_number: i64,
    pub period_label: String,
}

/// Creates the draft submission for (program, period).
///
/// The unique constraint on (program_id, period_id) is the arbiter under
/// concurrent callers: exactly one row wins, the loser gets
/// `DuplicateSubmission`.
pub fn create_draft(
    store: &Store,
    actor: &Actor,
    program_id: &str,
    period_id: &str,
    content: &JsonValue,
) -> Result<Submission, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);
    let payload = encode_content(content)?;

    broker.with_conn(&db_path, actor, "submission.create_draft", |conn| {
        let period_exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM periods WHERE id = ?1",
            params![period_id],
            |row| row.get(0),
        )?;
        if period_exists == 0 {
            return Err(QuarterdeckError::NotFound(format!("period {period_id}")));
        }

        let now = time::now_rfc3339();
        let submission = Submission {
            id: time::new_id(),
            program_id: program_id.to_string(),
            period_id: period_id.to_string(),
            agency_id: actor.agency_id.clone(),
            content: content.clone(),
            state: DraftState::Draft,
            submitted_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let result = conn.execute(
            "INSERT INTO submissions(id, program_id, period_id, agency_id, content, draft, submitted_at, created_at, updated_at) \
             VALUES(?1, ?2, ?3, ?4, ?5, 1, NULL, ?6, ?7)",
            params![
                submission.id,
                submission.program_id,
                submission.period_id,
                submission.agency_id,
                payload,
                submission.created_at,
                submission.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(submission),
            Err(err) if is_unique_violation(&err) => Err(QuarterdeckError::DuplicateSubmission {
                program_id: program_id.to_string(),
                period_id: period_id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    })
}

/// Rewrites a draft's content in place. Finalized submissions are immutable
/// except via an explicit reopen.
pub fn update_draft(
    store: &Store,
    actor: &Actor,
    submission_id: &str,
    content: &JsonValue,
) -> Result<Submission, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);
    let payload = encode_content(content)?;

    broker.with_conn(&db_path, actor, "submission.update_draft", |conn| {
        let mut submission = fetch_submission(conn, submission_id)?;
        if !submission.is_draft() {
            return Err(QuarterdeckError::NotDraft(submission_id.to_string()));
        }
        let now = time::now_rfc3339();
        conn.execute(
            "UPDATE submissions SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![payload, now, submission_id],
        )?;
        submission.content = content.clone();
        submission.updated_at = now;
        Ok(submission)
    })
}

/// Finalizes a draft: flips the draft flag and stamps the submission time.
pub fn finalize(
    store: &Store,
    actor: &Actor,
    submission_id: &str,
) -> Result<Submission, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "submission.finalize", |conn| {
        let mut submission = fetch_submission(conn, submission_id)?;
        if !submission.is_draft() {
            return Err(QuarterdeckError::AlreadyFinal(submission_id.to_string()));
        }
        let now = time::now_rfc3339();
        conn.execute(
            "UPDATE submissions SET draft = 0, submitted_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, submission_id],
        )?;
        submission.state = DraftState::Final;
        submission.submitted_at = Some(now.clone());
        submission.updated_at = now;
        Ok(submission)
    })
}

/// Reopens a finalized submission for editing (resubmit semantics). The
/// reverse transition is always explicit; nothing reopens implicitly.
/// `submitted_at` keeps the last finalization stamp until the next one.
pub fn reopen(
    store: &Store,
    actor: &Actor,
    submission_id: &str,
) -> Result<Submission, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "submission.reopen", |conn| {
        let mut submission = fetch_submission(conn, submission_id)?;
        if submission.is_draft() {
            return Err(QuarterdeckError::AlreadyDraft(submission_id.to_string()));
        }
        let now = time::now_rfc3339();
        conn.execute(
            "UPDATE submissions SET draft = 1, updated_at = ?1 WHERE id = ?2",
            params![now, submission_id],
        )?;
        submission.state = DraftState::Draft;
        submission.updated_at = now;
        Ok(submission)
    })
}

pub fn get_submission(
    store: &Store,
    actor: &Actor,
    submission_id: &str,
) -> Result<Submission, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "submission.get", |conn| {
        fetch_submission(conn, submission_id)
    })
}

/// The authoritative timeline for history reconstruction: one entry per
/// period that has ever had a submission, ordered by (year, period_number)
/// ascending. Skipped periods are absent, never padded with placeholders.
pub fn get_history(
    store: &Store,
    actor: &Actor,
    program_id: &str,
) -> Result<Vec<SubmissionWithPeriod>, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "submission.history", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS}, p.year, p.period_number \
             FROM submissions s JOIN periods p ON p.id = s.period_id \
             WHERE s.program_id = ?1 \
             ORDER BY p.year ASC, p.period_number ASC"
        ))?;
        let rows = stmt.query_map(params![program_id], |row| {
            Ok((submission_row(row)?, row.get::<_, i64>(9)?, row.get::<_, i64>(10)?))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (parts, year, period_number) = row?;
            history.push(SubmissionWithPeriod {
                submission: submission_from_parts(parts)?,
                year,
                period_number,
                period_label: periods::period_label(period_number, year)?,
            });
        }
        Ok(history)
    })
}

const SUBMISSION_COLUMNS: &str =
    "s.id, s.program_id, s.period_id, s.agency_id, s.content, s.draft, s.submitted_at, s.created_at, s.updated_at";

type SubmissionParts = (
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    String,
    String,
);

fn submission_row(row: &rusqlite::Row) -> rusqlite::Result<SubmissionParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn submission_from_parts(parts: SubmissionParts) -> Result<Submission, QuarterdeckError> {
    let content: JsonValue = serde_json::from_str(&parts.4)
        .map_err(|e| QuarterdeckError::Validation(format!("stored content is not valid JSON: {e}")))?;
    Ok(Submission {
        id: parts.0,
        program_id: parts.1,
        period_id: parts.2,
        agency_id: parts.3,
        content,
        state: if parts.5 == 1 {
            DraftState::Draft
        } else {
            DraftState::Final
        },
        submitted_at: parts.6,
        created_at: parts.7,
        updated_at: parts.8,
    })
}

fn fetch_submission(conn: &Connection, id: &str) -> Result<Submission, QuarterdeckError> {
    let parts = conn
        .query_row(
            &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.id = ?1"),
            params![id],
            submission_row,
        )
        .optional()?;
    match parts {
        Some(parts) => submission_from_parts(parts),
        None => Err(QuarterdeckError::NotFound(format!("submission {id}"))),
    }
}

fn encode_content(content: &JsonValue) -> Result<String, QuarterdeckError> {
    serde_json::to_string(content)
        .map_err(|e| QuarterdeckError::Validation(format!("content is not serializable: {e}")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
