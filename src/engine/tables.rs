//! Flexible Table Model: a schema-flexible tabular payload for metric data.
//!
//! Rows and columns are defined at runtime by an ordered schema; cell data is
//! keyed row-id -> column-id with numeric-or-null values. Schema and data are
//! always rewritten together so a stored record validates at every point.
//! Legacy records predating the schema-first format (flat month -> year ->
//! value documents) are migrated once at import time; first-seen key order is
//! trusted as display order and never re-sorted.

use crate::core::broker::{Actor, DbBroker};
use crate::core::db;
use crate::core::error::QuarterdeckError;
use crate::core::store::Store;
use crate::core::time;
use clap::ValueEnum;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashSet;

/// Numeric-type tag carried by a column descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Count,
    Percentage,
    Currency,
    Rate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub kind: ColumnKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RowSpec {
    pub id: String,
    pub label: String,
}

/// Ordered column and row descriptors. Order is display order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<RowSpec>,
}

/// Cell data: row-id -> { column-id -> number|null }. Backed by an
/// order-preserving JSON map so serialization round-trips losslessly.
pub type TableData = JsonMap<String, JsonValue>;

/// Checks that every data key resolves to a schema id and that every cell is
/// a JSON number or null. Numeric strings are rejected: explicit typing only.
pub fn validate(schema: &TableSchema, data: &TableData) -> Result<(), QuarterdeckError> {
    let row_ids: HashSet<&str> = schema.rows.iter().map(|r| r.id.as_str()).collect();
    let column_ids: HashSet<&str> = schema.columns.iter().map(|c| c.id.as_str()).collect();

    for (row_id, cells) in data {
        if !row_ids.contains(row_id.as_str()) {
            return Err(QuarterdeckError::OrphanRow(row_id.clone()));
        }
        let cells = cells.as_object().ok_or_else(|| {
            QuarterdeckError::Validation(format!("row '{row_id}' must map column ids to values"))
        })?;
        for (column_id, value) in cells {
            if !column_ids.contains(column_id.as_str()) {
                return Err(QuarterdeckError::OrphanColumn(column_id.clone()));
            }
            if !value.is_null() && !value.is_number() {
                return Err(QuarterdeckError::NonNumericCell {
                    row: row_id.clone(),
                    column: column_id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Appends a column descriptor and backfills null into every existing data
/// row, so the result validates with no missing keys.
pub fn add_column(
    schema: &mut TableSchema,
    data: &mut TableData,
    column: ColumnSpec,
) -> Result<(), QuarterdeckError> {
    if schema.columns.iter().any(|c| c.id == column.id) {
        return Err(QuarterdeckError::DuplicateColumnId(column.id));
    }
    for (_row_id, cells) in data.iter_mut() {
        if let Some(cells) = cells.as_object_mut() {
            cells.insert(column.id.clone(), JsonValue::Null);
        }
    }
    schema.columns.push(column);
    Ok(())
}

/// Strips a column from the schema and from every row's value map.
pub fn remove_column(
    schema: &mut TableSchema,
    data: &mut TableData,
    column_id: &str,
) -> Result<(), QuarterdeckError> {
    let idx = schema
        .columns
        .iter()
        .position(|c| c.id == column_id)
        .ok_or_else(|| QuarterdeckError::UnknownColumn(column_id.to_string()))?;
    schema.columns.remove(idx);
    for (_row_id, cells) in data.iter_mut() {
        if let Some(cells) = cells.as_object_mut() {
            cells.shift_remove(column_id);
        }
    }
    Ok(())
}

/// Appends a row descriptor seeded with null for every schema column.
pub fn add_row(
    schema: &mut TableSchema,
    data: &mut TableData,
    row: RowSpec,
) -> Result<(), QuarterdeckError> {
    if schema.rows.iter().any(|r| r.id == row.id) {
        return Err(QuarterdeckError::DuplicateRowId(row.id));
    }
    let mut cells = JsonMap::new();
    for column in &schema.columns {
        cells.insert(column.id.clone(), JsonValue::Null);
    }
    data.insert(row.id.clone(), JsonValue::Object(cells));
    schema.rows.push(row);
    Ok(())
}

/// Strips a row from the schema and its cells from the data.
pub fn remove_row(
    schema: &mut TableSchema,
    data: &mut TableData,
    row_id: &str,
) -> Result<(), QuarterdeckError> {
    let idx = schema
        .rows
        .iter()
        .position(|r| r.id == row_id)
        .ok_or_else(|| QuarterdeckError::UnknownRow(row_id.to_string()))?;
    schema.rows.remove(idx);
    data.shift_remove(row_id);
    Ok(())
}

/// Writes one numeric-or-null cell. Both ids must resolve in the schema.
pub fn set_cell(
    schema: &TableSchema,
    data: &mut TableData,
    row_id: &str,
    column_id: &str,
    value: JsonValue,
) -> Result<(), QuarterdeckError> {
    if !schema.rows.iter().any(|r| r.id == row_id) {
        return Err(QuarterdeckError::UnknownRow(row_id.to_string()));
    }
    if !schema.columns.iter().any(|c| c.id == column_id) {
        return Err(QuarterdeckError::UnknownColumn(column_id.to_string()));
    }
    if !value.is_null() && !value.is_number() {
        return Err(QuarterdeckError::NonNumericCell {
            row: row_id.to_string(),
            column: column_id.to_string(),
        });
    }
    let cells = data
        .entry(row_id.to_string())
        .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    if let Some(cells) = cells.as_object_mut() {
        cells.insert(column_id.to_string(), value);
    }
    Ok(())
}

/// A full null grid for a schema: every schema row present with every column
/// set to null.
pub fn seed_data(schema: &TableSchema) -> TableData {
    let mut data = TableData::new();
    for row in &schema.rows {
        let mut cells = JsonMap::new();
        for column in &schema.columns {
            cells.insert(column.id.clone(), JsonValue::Null);
        }
        data.insert(row.id.clone(), JsonValue::Object(cells));
    }
    data
}

/// Migrates a legacy flat document (first-level keys = rows, second-level
/// keys = columns, scalar leaves) into the schema-first format. Row and
/// column order is first-seen key order; missing cells are backfilled as
/// null. An already-structured payload (an object with `schema` and `data`
/// members) passes through unchanged, making migration idempotent.
pub fn migrate_legacy(raw: &JsonValue) -> Result<(TableSchema, TableData), QuarterdeckError> {
    let obj = raw.as_object().ok_or_else(|| {
        QuarterdeckError::Validation("tabular payload must be a JSON object".to_string())
    })?;

    if obj.contains_key("schema") && obj.contains_key("data") {
        let schema: TableSchema = serde_json::from_value(obj["schema"].clone()).map_err(|e| {
            QuarterdeckError::Validation(format!("structured payload has a bad schema: {e}"))
        })?;
        let data = obj["data"].as_object().cloned().ok_or_else(|| {
            QuarterdeckError::Validation("structured payload has non-object data".to_string())
        })?;
        return Ok((schema, data));
    }

    let mut schema = TableSchema::default();
    for (row_key, cells) in obj {
        schema.rows.push(RowSpec {
            id: row_key.clone(),
            label: row_key.clone(),
        });
        let cells = cells.as_object().ok_or_else(|| {
            QuarterdeckError::Validation(format!("legacy row '{row_key}' must be an object"))
        })?;
        for (column_key, value) in cells {
            if !schema.columns.iter().any(|c| c.id == *column_key) {
                schema.columns.push(ColumnSpec {
                    id: column_key.clone(),
                    label: column_key.clone(),
                    unit: None,
                    kind: ColumnKind::Count,
                });
            }
            if !value.is_null() && !value.is_number() {
                return Err(QuarterdeckError::NonNumericCell {
                    row: row_key.clone(),
                    column: column_key.clone(),
                });
            }
        }
    }

    let mut data = TableData::new();
    for row in &schema.rows {
        let source = obj.get(&row.id).and_then(|cells| cells.as_object());
        let mut out = JsonMap::new();
        for column in &schema.columns {
            let value = source
                .and_then(|cells| cells.get(&column.id))
                .cloned()
                .unwrap_or(JsonValue::Null);
            out.insert(column.id.clone(), value);
        }
        data.insert(row.id.clone(), JsonValue::Object(out));
    }
    Ok((schema, data))
}

// ---- Persistence over the `records` table -------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TabularRecord {
    pub id: String,
    pub name: String,
    pub schema: TableSchema,
    pub data: TableData,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RecordSummary {
    pub id: String,
    pub name: String,
    pub updated_at: String,
}

pub fn create_record(
    store: &Store,
    actor: &Actor,
    name: &str,
    schema: TableSchema,
    data: TableData,
) -> Result<TabularRecord, QuarterdeckError> {
    validate(&schema, &data)?;
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "record.create", |conn| {
        let now = time::now_rfc3339();
        let record = TabularRecord {
            id: time::new_id(),
            name: name.to_string(),
            schema,
            data,
            created_at: now.clone(),
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO records(id, name, schema, data, created_at, updated_at) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.name,
                encode_schema(&record.schema)?,
                encode_data(&record.data)?,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(record)
    })
}

/// Migrates a raw payload (legacy or structured) and stores it as a record.
pub fn import_payload(
    store: &Store,
    actor: &Actor,
    name: &str,
    raw: &JsonValue,
) -> Result<TabularRecord, QuarterdeckError> {
    let (schema, data) = migrate_legacy(raw)?;
    create_record(store, actor, name, schema, data)
}

pub fn get_record(
    store: &Store,
    actor: &Actor,
    record_id: &str,
) -> Result<TabularRecord, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "record.get", |conn| {
        fetch_record(conn, record_id)
    })
}

pub fn list_records(store: &Store, actor: &Actor) -> Result<Vec<RecordSummary>, QuarterdeckError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, "record.list", |conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, updated_at FROM records ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(RecordSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    })
}

/// Applies a paired schema+data mutation to a stored record, re-validates,
/// and rewrites both blobs in one statement. The schema is never written
/// without its data, nor the data without its schema.
pub fn mutate_record<F>(
    store: &Store,
    actor: &Actor,
    record_id: &str,
    op_name: &str,
    mutation: F,
) -> Result<TabularRecord, QuarterdeckError>
where
    F: FnOnce(&mut TableSchema, &mut TableData) -> Result<(), QuarterdeckError>,
{
    let broker = DbBroker::new(&store.root);
    let db_path = db::reporting_db_path(&store.root);

    broker.with_conn(&db_path, actor, op_name, |conn| {
        let tx = conn.unchecked_transaction()?;
        let mut record = fetch_record(&tx, record_id)?;
        mutation(&mut record.schema, &mut record.data)?;
        validate(&record.schema, &record.data)?;
        record.updated_at = time::now_rfc3339();
        tx.execute(
            "UPDATE records SET schema = ?1, data = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                encode_schema(&record.schema)?,
                encode_data(&record.data)?,
                record.updated_at,
                record.id,
            ],
        )?;
        tx.commit()?;
        Ok(record)
    })
}

fn fetch_record(conn: &Connection, id: &str) -> Result<TabularRecord, QuarterdeckError> {
    let parts = conn
        .query_row(
            "SELECT id, name, schema, data, created_at, updated_at FROM records WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    let (id, name, schema_raw, data_raw, created_at, updated_at) =
        parts.ok_or_else(|| QuarterdeckError::NotFound(format!("record {id}")))?;
    let schema: TableSchema = serde_json::from_str(&schema_raw)
        .map_err(|e| QuarterdeckError::Validation(format!("stored schema is not valid: {e}")))?;
    let data: TableData = serde_json::from_str(&data_raw)
        .map_err(|e| QuarterdeckError::Validation(format!("stored data is not valid: {e}")))?;
    Ok(TabularRecord {
        id,
        name,
        schema,
        data,
        created_at,
        updated_at,
    })
}

fn encode_schema(schema: &TableSchema) -> Result<String, QuarterdeckError> {
    serde_json::to_string(schema)
        .map_err(|e| QuarterdeckError::Validation(format!("schema is not serializable: {e}")))
}

fn encode_data(data: &TableData) -> Result<String, QuarterdeckError> {
    serde_json::to_string(data)
        .map_err(|e| QuarterdeckError::Validation(format!("data is not serializable: {e}")))
}
