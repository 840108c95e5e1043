use crate::domain::model::{Dataset, LookupMapping, MappingRule, QueryTransform, Record};
use crate::utils::error::{ConvertError, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use std::collections::HashMap;

/// Name of the virtual table a query transform runs against.
pub const QUERY_TABLE: &str = "input_table";

/// Column-level value remapping. Every operation returns a new `Dataset`;
/// the input is never touched, so callers can keep it for undo.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnMapper;

impl ColumnMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, dataset: &Dataset, rule: &MappingRule) -> Result<Dataset> {
        match rule {
            MappingRule::Lookup { column, mapping } => self.apply_lookup(dataset, column, mapping),
            MappingRule::Query(query) => self.apply_query(dataset, query),
        }
    }

    /// Translates `column` through `mapping`. Row count and order are unchanged,
    /// rows without the cell are left as they are.
    pub fn apply_lookup(
        &self,
        dataset: &Dataset,
        column: &str,
        mapping: &LookupMapping,
    ) -> Result<Dataset> {
        if !dataset.has_column(column) {
            return Err(ConvertError::UnknownColumn {
                column: column.to_string(),
            });
        }

        let mut changed = 0usize;
        let records: Vec<Record> = dataset
            .records()
            .iter()
            .map(|record| {
                let mut record = record.clone();
                if let Some(value) = record.data.get_mut(column) {
                    let translated = mapping.translate(value);
                    if translated != *value {
                        changed += 1;
                    }
                    *value = translated;
                }
                record
            })
            .collect();

        tracing::debug!(
            "🔁 Lookup on '{}': {} of {} values changed",
            column,
            changed,
            records.len()
        );

        Ok(dataset.with_records(records))
    }

    /// Runs a read-only SQL statement against the dataset loaded as `input_table`
    /// in a private in-memory SQLite database. Unknown columns and syntax errors are
    /// reported when the statement is compiled, before any row is evaluated.
    pub fn apply_query(&self, dataset: &Dataset, query: &QueryTransform) -> Result<Dataset> {
        let sql = query.sql.trim();
        if sql.is_empty() {
            return Err(ConvertError::mapping("query is empty"));
        }

        let conn = Connection::open_in_memory()?;
        load_table(&conn, dataset)?;

        let mut stmt = conn.prepare(sql).map_err(classify_compile_error)?;
        if !stmt.readonly() {
            return Err(ConvertError::mapping(format!(
                "only read-only SELECT statements can transform the table: `{}`",
                sql
            )));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        if columns.is_empty() {
            return Err(ConvertError::mapping(format!(
                "query returns no columns: `{}`",
                sql
            )));
        }

        let mut records = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut data = HashMap::with_capacity(columns.len());
            for (index, name) in columns.iter().enumerate() {
                let value: SqlValue = row.get(index)?;
                data.insert(name.clone(), sql_value_to_text(value));
            }
            records.push(Record { data });
        }

        tracing::debug!(
            "🧮 Query produced {} rows x {} columns (input {} rows)",
            records.len(),
            columns.len(),
            dataset.len()
        );

        Dataset::new(columns, records)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn load_table(conn: &Connection, dataset: &Dataset) -> Result<()> {
    if dataset.columns().is_empty() {
        return Err(ConvertError::mapping("the table has no columns to query"));
    }

    let quoted: Vec<String> = dataset.columns().iter().map(|c| quote_ident(c)).collect();
    let definitions: Vec<String> = quoted.iter().map(|c| format!("{} TEXT", c)).collect();
    conn.execute(
        &format!("CREATE TABLE {} ({})", QUERY_TABLE, definitions.join(", ")),
        [],
    )?;

    let slots: Vec<String> = (1..=quoted.len()).map(|i| format!("?{}", i)).collect();
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            QUERY_TABLE,
            quoted.join(", "),
            slots.join(", ")
        ))?;
        for record in dataset.records() {
            let cells: Vec<Option<&str>> = dataset
                .columns()
                .iter()
                .map(|column| record.get(column))
                .collect();
            insert.execute(rusqlite::params_from_iter(cells))?;
        }
    }
    tx.commit()?;

    Ok(())
}

fn classify_compile_error(error: rusqlite::Error) -> ConvertError {
    let message = error.to_string();
    if let Some(rest) = message.split("no such column: ").nth(1) {
        return ConvertError::UnknownColumn {
            column: unknown_column_name(rest),
        };
    }
    ConvertError::mapping(format!("query rejected: {}", message))
}

/// The column name from the tail of a `no such column: ...` message. Newer SQLite
/// builds append the statement and an offset.
fn unknown_column_name(rest: &str) -> String {
    let end = [" in ", " at offset"]
        .iter()
        .filter_map(|suffix| rest.find(suffix))
        .min()
        .unwrap_or(rest.len());
    let name = rest[..end].trim();
    let unquoted = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .or_else(|| name.strip_prefix('`').and_then(|n| n.strip_suffix('`')))
        .or_else(|| name.strip_prefix('[').and_then(|n| n.strip_suffix(']')))
        .unwrap_or(name);
    unquoted.to_string()
}

fn sql_value_to_text(value: SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s,
        SqlValue::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}
