//! CLI struct definitions for the Quarterdeck command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::engine::periods::{PeriodStatus, PeriodType};
use crate::engine::tables::ColumnKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "quarterdeck",
    version = env!("CARGO_PKG_VERSION"),
    about = "Quarterdeck is the local-first data engine for periodic program reporting: period lifecycle, draft/final submissions, field-level history, and schema-flexible metric tables."
)]
pub struct Cli {
    /// Store root directory (defaults to QUARTERDECK_HOME or ./.quarterdeck/data).
    #[clap(long, global = true)]
    pub dir: Option<PathBuf>,
    /// Acting user id (defaults from quarterdeck.toml).
    #[clap(long, global = true)]
    pub actor: Option<String>,
    /// Acting role.
    #[clap(long, global = true)]
    pub role: Option<String>,
    /// Acting agency id (stamped onto created submissions).
    #[clap(long, global = true)]
    pub agency: Option<String>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a reporting store in the target directory.
    Init,
    /// Manage the reporting-period timeline.
    Period(PeriodCli),
    /// Manage program submissions.
    Submission(SubmissionCli),
    /// Manage flexible tabular records.
    Record(RecordCli),
}

#[derive(clap::Args, Debug)]
pub struct PeriodCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: PeriodCommand,
}

#[derive(Subcommand, Debug)]
pub enum PeriodCommand {
    /// Ensure exactly one open period covers the current instant.
    Ensure {
        /// Override the configured reporting cadence.
        #[clap(long, value_enum)]
        cadence: Option<PeriodType>,
    },
    /// List periods ordered by (year, number).
    List {
        #[clap(long)]
        year: Option<i64>,
        #[clap(long, value_enum)]
        cadence: Option<PeriodType>,
        #[clap(long, value_enum)]
        status: Option<PeriodStatus>,
    },
    /// Print the display label for a period number.
    Label {
        #[clap(long)]
        number: i64,
        #[clap(long)]
        year: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct SubmissionCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: SubmissionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubmissionCommand {
    /// Create the draft submission for a (program, period) pair.
    Create {
        #[clap(long)]
        program: String,
        #[clap(long)]
        period: String,
        /// Content payload as a JSON document.
        #[clap(long, default_value = "{}")]
        content: String,
    },
    /// Rewrite a draft's content.
    Update {
        #[clap(long)]
        id: String,
        #[clap(long)]
        content: String,
    },
    /// Finalize a draft (locks it from further edits).
    Finalize {
        #[clap(long)]
        id: String,
    },
    /// Reopen a finalized submission for editing.
    Reopen {
        #[clap(long)]
        id: String,
    },
    /// Get a submission by id.
    Show {
        #[clap(long)]
        id: String,
    },
    /// List a program's submission timeline across periods.
    History {
        #[clap(long)]
        program: String,
    },
    /// Render the derived change timeline of one content field.
    FieldHistory {
        #[clap(long)]
        program: String,
        #[clap(long)]
        field: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct RecordCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: RecordCommand,
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Create a tabular record from an explicit schema (data defaults to a null grid).
    Create {
        #[clap(long)]
        name: String,
        /// Table schema as a JSON document.
        #[clap(long)]
        schema: String,
        /// Optional initial data as a JSON document.
        #[clap(long)]
        data: Option<String>,
    },
    /// Import a raw payload, migrating legacy flat documents to the schema-first format.
    Import {
        #[clap(long)]
        name: String,
        /// Payload as a JSON document (legacy flat or structured).
        #[clap(long)]
        payload: String,
    },
    /// Show a record's schema and cells.
    Show {
        #[clap(long)]
        id: String,
    },
    /// List records.
    List,
    /// Append a column and backfill null into every row.
    AddColumn {
        #[clap(long)]
        id: String,
        #[clap(long)]
        column: String,
        #[clap(long)]
        label: Option<String>,
        #[clap(long)]
        unit: Option<String>,
        #[clap(long, value_enum, default_value = "count")]
        kind: ColumnKind,
    },
    /// Remove a column from the schema and every row.
    RemoveColumn {
        #[clap(long)]
        id: String,
        #[clap(long)]
        column: String,
    },
    /// Append a row seeded with nulls.
    AddRow {
        #[clap(long)]
        id: String,
        #[clap(long)]
        row: String,
        #[clap(long)]
        label: Option<String>,
    },
    /// Remove a row and its cells.
    RemoveRow {
        #[clap(long)]
        id: String,
        #[clap(long)]
        row: String,
    },
    /// Write one numeric cell (omit --value to store null).
    SetCell {
        #[clap(long)]
        id: String,
        #[clap(long)]
        row: String,
        #[clap(long)]
        column: String,
        #[clap(long)]
        value: Option<f64>,
    },
}
