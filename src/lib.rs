//! Quarterdeck: a local-first data engine for periodic program reporting.
//!
//! Agencies submit periodic program data; administrators review it. The
//! engine owns the only state with real invariants:
//!
//! - **Period Manager** ([`engine::periods`]): the reporting-period timeline.
//!   Periods are quarters or half-years, numbered sequentially within a year,
//!   with exactly one open period system-wide and no gaps or overlaps.
//! - **Submission Store** ([`engine::submissions`]): one versioned submission
//!   row per (program, period), mutated in place while draft; finalization is
//!   a state flip, never a new row.
//! - **History Reconstructor** ([`engine::history`]): pure derivation of
//!   per-field change timelines from a program's ordered submissions.
//! - **Flexible Table Model** ([`engine::tables`]): runtime-defined rows and
//!   columns over numeric-or-null cells, with lossless legacy migration.
//!
//! All durable state lives in one SQLite database under a store root; every
//! mutation routes through the [`core::broker::DbBroker`] thin waist, which
//! serializes access and appends an audit event tagged with the acting
//! identity. Rendering, sessions, and report export live outside this crate;
//! the CLI and JSON envelopes are the only upward surface.

pub mod cli;
pub mod core;
pub mod engine;

use crate::cli::{
    Cli, Command, OutputFormat, PeriodCli, PeriodCommand, RecordCli, RecordCommand, SubmissionCli,
    SubmissionCommand,
};
use crate::core::broker::Actor;
use crate::core::config::{self, Config};
use crate::core::db;
use crate::core::error::QuarterdeckError;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::history;
use crate::engine::periods::{self, PeriodFilter, ReportingPeriod};
use crate::engine::submissions::{self, Submission};
use crate::engine::tables::{self, ColumnSpec, RowSpec, TabularRecord};
use clap::Parser;
use colored::Colorize;
use serde_json::{json, Value as JsonValue};

pub fn run() -> Result<(), QuarterdeckError> {
    let cli = Cli::parse();
    let store = Store::resolve(cli.dir.clone());
    let config = config::load(&store.root)?;
    let actor = resolve_actor(&cli, &config);

    match cli.command {
        Command::Init => run_init(&store),
        Command::Period(args) => run_period_cli(&store, &actor, &config, args),
        Command::Submission(args) => run_submission_cli(&store, &actor, args),
        Command::Record(args) => run_record_cli(&store, &actor, args),
    }
}

fn resolve_actor(cli: &Cli, config: &Config) -> Actor {
    Actor {
        user_id: cli
            .actor
            .clone()
            .or_else(|| config.actor.user_id.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        role: cli
            .role
            .clone()
            .or_else(|| config.actor.role.clone())
            .unwrap_or_else(|| "agency_user".to_string()),
        agency_id: cli
            .agency
            .clone()
            .or_else(|| config.actor.agency_id.clone())
            .unwrap_or_default(),
    }
}

fn run_init(store: &Store) -> Result<(), QuarterdeckError> {
    config::write_default(&store.root)?;
    db::initialize_reporting_db(&store.root)?;
    println!(
        "{} Reporting store initialized at {}",
        "✓".bright_green(),
        store.root.display()
    );
    Ok(())
}

fn parse_json_arg(raw: &str, what: &str) -> Result<JsonValue, QuarterdeckError> {
    serde_json::from_str(raw)
        .map_err(|e| QuarterdeckError::Validation(format!("{what} is not valid JSON: {e}")))
}

// ===== period =====

fn run_period_cli(
    store: &Store,
    actor: &Actor,
    config: &Config,
    cli: PeriodCli,
) -> Result<(), QuarterdeckError> {
    db::initialize_reporting_db(&store.root)?;
    match cli.command {
        PeriodCommand::Ensure { cadence } => {
            let cadence = cadence.unwrap_or(config.cadence);
            let period = periods::ensure_current_period(store, actor, cadence, time::now_utc())?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope("period.ensure", "ok", json!({ "period": period }))
                ),
                OutputFormat::Text => {
                    println!("{} {}", "Open period:".bright_green(), period_line(&period)?)
                }
            }
        }
        PeriodCommand::List {
            year,
            cadence,
            status,
        } => {
            let filter = PeriodFilter {
                year,
                period_type: cadence,
                status,
            };
            let listed = periods::list_periods(store, actor, &filter)?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope("period.list", "ok", json!({ "periods": listed }))
                ),
                OutputFormat::Text => {
                    for period in &listed {
                        println!("{}", period_line(period)?);
                    }
                }
            }
        }
        PeriodCommand::Label { number, year } => {
            let label = periods::period_label(number, year)?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope("period.label", "ok", json!({ "label": label }))
                ),
                OutputFormat::Text => println!("{}", label),
            }
        }
    }
    Ok(())
}

fn period_line(period: &ReportingPeriod) -> Result<String, QuarterdeckError> {
    Ok(format!(
        "{} [{} → {}] {} ({})",
        period.label()?,
        period.starts_at,
        period.ends_at,
        period.status.as_str(),
        period.id,
    ))
}

// ===== submission =====

fn run_submission_cli(
    store: &Store,
    actor: &Actor,
    cli: SubmissionCli,
) -> Result<(), QuarterdeckError> {
    db::initialize_reporting_db(&store.root)?;
    match cli.command {
        SubmissionCommand::Create {
            program,
            period,
            content,
        } => {
            let content = parse_json_arg(&content, "content")?;
            let submission = submissions::create_draft(store, actor, &program, &period, &content)?;
            print_submission(cli.format, "submission.create", &submission);
        }
        SubmissionCommand::Update { id, content } => {
            let content = parse_json_arg(&content, "content")?;
            let submission = submissions::update_draft(store, actor, &id, &content)?;
            print_submission(cli.format, "submission.update", &submission);
        }
        SubmissionCommand::Finalize { id } => {
            let submission = submissions::finalize(store, actor, &id)?;
            print_submission(cli.format, "submission.finalize", &submission);
        }
        SubmissionCommand::Reopen { id } => {
            let submission = submissions::reopen(store, actor, &id)?;
            print_submission(cli.format, "submission.reopen", &submission);
        }
        SubmissionCommand::Show { id } => {
            let submission = submissions::get_submission(store, actor, &id)?;
            print_submission(cli.format, "submission.show", &submission);
        }
        SubmissionCommand::History { program } => {
            let timeline = submissions::get_history(store, actor, &program)?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope(
                        "submission.history",
                        "ok",
                        json!({ "program_id": program, "history": timeline })
                    )
                ),
                OutputFormat::Text => {
                    for entry in &timeline {
                        println!(
                            "{}: {} ({})",
                            entry.period_label,
                            submission_status(&entry.submission),
                            entry.submission.id,
                        );
                    }
                }
            }
        }
        SubmissionCommand::FieldHistory { program, field } => {
            let timeline = submissions::get_history(store, actor, &program)?;
            let entries = history::timeline_entries(&timeline);
            let changes = history::field_history(&entries, &field);
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope(
                        "submission.field_history",
                        "ok",
                        json!({ "program_id": program, "field": field, "changes": changes })
                    )
                ),
                OutputFormat::Text => {
                    if changes.is_empty() {
                        println!(
                            "Not enough history for '{}' (need at least 2 submissions).",
                            field
                        );
                    } else {
                        for change in &changes {
                            let marker = if change.changed_from_previous {
                                "changed".bright_yellow()
                            } else {
                                "unchanged".bright_black()
                            };
                            println!("{}: {} [{}]", change.period_label, change.value, marker);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn submission_status(submission: &Submission) -> &'static str {
    if submission.is_draft() {
        "draft"
    } else {
        "final"
    }
}

fn print_submission(format: OutputFormat, cmd: &str, submission: &Submission) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope(cmd, "ok", json!({ "submission": submission }))
        ),
        OutputFormat::Text => println!(
            "{} {} program={} period={} status={}",
            "✓".bright_green(),
            submission.id,
            submission.program_id,
            submission.period_id,
            submission_status(submission),
        ),
    }
}

// ===== record =====

fn run_record_cli(store: &Store, actor: &Actor, cli: RecordCli) -> Result<(), QuarterdeckError> {
    db::initialize_reporting_db(&store.root)?;
    match cli.command {
        RecordCommand::Create { name, schema, data } => {
            let schema: tables::TableSchema =
                serde_json::from_value(parse_json_arg(&schema, "schema")?).map_err(|e| {
                    QuarterdeckError::Validation(format!("schema does not match the table shape: {e}"))
                })?;
            let data = match data {
                Some(raw) => parse_json_arg(&raw, "data")?
                    .as_object()
                    .cloned()
                    .ok_or_else(|| {
                        QuarterdeckError::Validation("data must be a JSON object".to_string())
                    })?,
                None => tables::seed_data(&schema),
            };
            let record = tables::create_record(store, actor, &name, schema, data)?;
            print_record(cli.format, "record.create", &record);
        }
        RecordCommand::Import { name, payload } => {
            let raw = parse_json_arg(&payload, "payload")?;
            let record = tables::import_payload(store, actor, &name, &raw)?;
            print_record(cli.format, "record.import", &record);
        }
        RecordCommand::Show { id } => {
            let record = tables::get_record(store, actor, &id)?;
            print_record(cli.format, "record.show", &record);
        }
        RecordCommand::List => {
            let listed = tables::list_records(store, actor)?;
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope("record.list", "ok", json!({ "records": listed }))
                ),
                OutputFormat::Text => {
                    for summary in &listed {
                        println!("{} {} (updated {})", summary.id, summary.name, summary.updated_at);
                    }
                }
            }
        }
        RecordCommand::AddColumn {
            id,
            column,
            label,
            unit,
            kind,
        } => {
            let spec = ColumnSpec {
                label: label.unwrap_or_else(|| column.clone()),
                id: column,
                unit,
                kind,
            };
            let record = tables::mutate_record(store, actor, &id, "record.add_column", |schema, data| {
                tables::add_column(schema, data, spec)
            })?;
            print_record(cli.format, "record.add_column", &record);
        }
        RecordCommand::RemoveColumn { id, column } => {
            let record =
                tables::mutate_record(store, actor, &id, "record.remove_column", |schema, data| {
                    tables::remove_column(schema, data, &column)
                })?;
            print_record(cli.format, "record.remove_column", &record);
        }
        RecordCommand::AddRow { id, row, label } => {
            let spec = RowSpec {
                label: label.unwrap_or_else(|| row.clone()),
                id: row,
            };
            let record = tables::mutate_record(store, actor, &id, "record.add_row", |schema, data| {
                tables::add_row(schema, data, spec)
            })?;
            print_record(cli.format, "record.add_row", &record);
        }
        RecordCommand::RemoveRow { id, row } => {
            let record = tables::mutate_record(store, actor, &id, "record.remove_row", |schema, data| {
                tables::remove_row(schema, data, &row)
            })?;
            print_record(cli.format, "record.remove_row", &record);
        }
        RecordCommand::SetCell {
            id,
            row,
            column,
            value,
        } => {
            let cell = value.map(|v| json!(v)).unwrap_or(JsonValue::Null);
            let record = tables::mutate_record(store, actor, &id, "record.set_cell", |schema, data| {
                tables::set_cell(schema, data, &row, &column, cell)
            })?;
            print_record(cli.format, "record.set_cell", &record);
        }
    }
    Ok(())
}

fn print_record(format: OutputFormat, cmd: &str, record: &TabularRecord) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            time::command_envelope(cmd, "ok", json!({ "record": record }))
        ),
        OutputFormat::Text => {
            println!(
                "{} {} ({})",
                "Record:".bright_green(),
                record.name,
                record.id
            );
            let header: Vec<&str> = record
                .schema
                .columns
                .iter()
                .map(|c| c.label.as_str())
                .collect();
            println!("  {}", header.join(" | "));
            for row in &record.schema.rows {
                let cells: Vec<String> = record
                    .schema
                    .columns
                    .iter()
                    .map(|column| {
                        record
                            .data
                            .get(&row.id)
                            .and_then(|cells| cells.get(&column.id))
                            .filter(|v| !v.is_null())
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    })
                    .collect();
                println!("  {}: {}", row.label, cells.join(" | "));
            }
        }
    }
}
