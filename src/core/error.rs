use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarterdeckError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("period sequencing fault: {0}")]
    PeriodSequencing(String),
    #[error("invalid period encoding: {0} is not a known period number")]
    InvalidPeriodEncoding(i64),
    #[error("a submission already exists for program {program_id} in period {period_id}")]
    DuplicateSubmission {
        program_id: String,
        period_id: String,
    },
    #[error("submission {0} is not a draft; reopen it before editing")]
    NotDraft(String),
    #[error("submission {0} is already final")]
    AlreadyFinal(String),
    #[error("submission {0} is already a draft")]
    AlreadyDraft(String),
    #[error("data row '{0}' is not declared in the table schema")]
    OrphanRow(String),
    #[error("data column '{0}' is not declared in the table schema")]
    OrphanColumn(String),
    #[error("column id '{0}' already exists in the table schema")]
    DuplicateColumnId(String),
    #[error("row id '{0}' already exists in the table schema")]
    DuplicateRowId(String),
    #[error("unknown column id '{0}'")]
    UnknownColumn(String),
    #[error("unknown row id '{0}'")]
    UnknownRow(String),
    #[error("cell {row}/{column} must be a JSON number or null")]
    NonNumericCell { row: String, column: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("config error: {0}")]
    Config(String),
}

impl QuarterdeckError {
    /// Sequencing faults mean the period timeline itself is inconsistent.
    /// They must reach an operator; nothing downstream may auto-correct them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PeriodSequencing(_))
    }
}
