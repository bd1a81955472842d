//! Backend connection traits and the rusqlite adapter.
//!
//! The pool and gateway only see `BackendConnection` / `ConnectionFactory`.
//! Rows come back as ordered column→value maps with lower-cased column names,
//! so every caller downstream can rely on a single casing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde_json::Value;

use super::errors::DbToolError;

/// One result row: column name (lower-cased) → JSON value, in select order.
pub type Row = serde_json::Map<String, Value>;

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A single live connection to the analytical backend.
///
/// Calls are synchronous; the gateway runs them on the blocking thread pool.
pub trait BackendConnection: Send {
    /// Run `sql` with positional `params`. With `max_rows`, stop reading once
    /// that many rows are collected; the rest are never materialized.
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        max_rows: Option<usize>,
    ) -> Result<Vec<Row>, DbToolError>;

    /// Cheap round trip used before handing the connection to a borrower.
    fn is_alive(&mut self) -> bool;
}

/// Opens new backend connections for the pool.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn BackendConnection>, DbToolError>;

    /// Human-readable target for logs.
    fn target(&self) -> String;
}

// ─── SQLite ──────────────────────────────────────────────────────────────────

/// Opens read-only connections to a SQLite database file.
pub struct SqliteConnectionFactory {
    path: PathBuf,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn connect(&self) -> Result<Box<dyn BackendConnection>, DbToolError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| {
            DbToolError::ConnectFailed {
                target: self.target(),
                reason: e.to_string(),
            }
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA query_only = ON;")?;

        tracing::debug!(target_db = %self.path.display(), "opened backend connection");
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn target(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

struct SqliteConnection {
    conn: Connection,
}

impl BackendConnection for SqliteConnection {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        max_rows: Option<usize>,
    ) -> Result<Vec<Row>, DbToolError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = unique_column_keys(stmt.column_names());

        let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let mut rows = stmt.query(params_from_iter(bound.iter()))?;

        let cap = max_rows.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        while out.len() < cap {
            let Some(row) = rows.next()? else {
                break;
            };
            let mut record = Row::new();
            for (idx, key) in columns.iter().enumerate() {
                record.insert(key.clone(), to_json_value(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn is_alive(&mut self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

/// Lower-case column names; later duplicates get a `_2`, `_3`, ... suffix.
fn unique_column_keys(names: Vec<&str>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let base = name.to_lowercase();
        let mut key = base.clone();
        let mut n = 2;
        while keys.contains(&key) {
            key = format!("{base}_{n}");
            n += 1;
        }
        keys.push(key);
    }
    keys
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
