//! Tool gateway: the four database tools exposed to the model.
//!
//! Every tool returns a `String`. Validation failures, denied statements and
//! backend errors are rendered as text for the model to read and correct;
//! nothing here propagates an error into the agent loop. Structured rows stay
//! internal until the final render.

use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use super::backend::Row;
use super::errors::DbToolError;
use super::pool::ConnectionPool;
use super::safety::{classify, is_select, SafetyVerdict};
use crate::agent_core::graph::ToolExecutor;
use crate::inference::types::{ToolCall, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

pub const LIST_ALL_TABLES: &str = "list_all_tables";
pub const SEARCH_TABLES_BY_KEYWORD: &str = "search_tables_by_keyword";
pub const GET_TABLE_DETAILS: &str = "get_table_details";
pub const RUN_SQL_QUERY: &str = "run_sql_query";

/// Default cap on rows returned by `run_sql_query`.
pub const DEFAULT_ROW_LIMIT: usize = 100;

/// Columns of every user table in schema `?1`, with a stable per-table order.
///
/// SQLite has no column comments, so `column_comment` is always NULL here; it
/// is kept so renderings and keyword matching have the same shape everywhere.
const CATALOG_CTE: &str = r"
WITH catalog AS (
    SELECT t.name AS table_name,
           c.name AS column_name,
           c.type AS data_type,
           CAST(NULL AS TEXT) AS column_comment,
           c.cid AS position
    FROM pragma_table_list AS t
    JOIN pragma_table_info(t.name, t.schema) AS c
    WHERE t.schema = ?1
      AND t.type = 'table'
      AND t.name NOT LIKE 'sqlite\_%' ESCAPE '\'
)";

const LIST_TABLES_SQL: &str = r"
SELECT name AS table_name
FROM pragma_table_list
WHERE schema = ?1
  AND type = 'table'
  AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
ORDER BY name";

// ─── Types ───────────────────────────────────────────────────────────────────

/// One column of one table, as returned by the catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub column_comment: Option<String>,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Self {
        let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            table_name: text("table_name").unwrap_or_default(),
            column_name: text("column_name").unwrap_or_default(),
            data_type: text("data_type").unwrap_or_default(),
            column_comment: text("column_comment").filter(|c| !c.is_empty()),
        }
    }

    /// `needle` must already be lower-cased.
    fn matches(&self, needle: &str) -> bool {
        self.table_name.to_lowercase().contains(needle)
            || self.column_name.to_lowercase().contains(needle)
            || self
                .column_comment
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(needle))
    }

    fn comment_or_placeholder(&self) -> &str {
        self.column_comment.as_deref().unwrap_or("no comment")
    }
}

/// Rows fetched by `run_sql_query`, already capped.
#[derive(Debug, Clone)]
struct QueryOutcome {
    rows: Vec<Row>,
    /// The backend returned more rows than the cap.
    truncated: bool,
}

// ─── ToolGateway ─────────────────────────────────────────────────────────────

/// Database tools backed by a shared connection pool.
pub struct ToolGateway {
    pool: ConnectionPool,
    schema: String,
    row_limit: usize,
}

impl ToolGateway {
    pub fn new(pool: ConnectionPool, schema: impl Into<String>, row_limit: usize) -> Self {
        Self {
            pool,
            schema: schema.into(),
            row_limit: row_limit.max(1),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// OpenAI function definitions for the fixed tool catalogue.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                LIST_ALL_TABLES,
                "List the names of every table in the database. Use this first to get an overview \
                 of the schema.",
                json!({"type": "object", "properties": {}, "required": []}),
            ),
            ToolDefinition::function(
                SEARCH_TABLES_BY_KEYWORD,
                "Find tables and columns whose table name, column name or column comment contains \
                 the keyword (case-insensitive). Returns (table, column, comment) entries.",
                json!({
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string", "description": "Substring to search for, e.g. 'order'"}
                    },
                    "required": ["keyword"]
                }),
            ),
            ToolDefinition::function(
                GET_TABLE_DETAILS,
                "Get the columns, data types and comments of specific tables. Call this before \
                 writing a query against them.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_names": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Exact table names"
                        }
                    },
                    "required": ["table_names"]
                }),
            ),
            ToolDefinition::function(
                RUN_SQL_QUERY,
                &format!(
                    "Execute a single read-only SELECT statement and return the rows as JSON. \
                     Results are capped at {} rows. `SHOW TABLES` lists the tables; other SHOW \
                     statements are not supported by this database.",
                    self.row_limit
                ),
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "The SQL statement to run"}
                    },
                    "required": ["sql"]
                }),
            ),
        ]
    }

    // ─── Dispatch ────────────────────────────────────────────────────────

    /// Execute one tool call and render its result.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let start = Instant::now();
        let args = &call.arguments;

        let result = match call.name.as_str() {
            LIST_ALL_TABLES => self.list_all_tables().await,
            SEARCH_TABLES_BY_KEYWORD => match string_arg(args, "keyword") {
                Some(keyword) => self.search_tables_by_keyword(keyword).await,
                None => invalid_arguments(SEARCH_TABLES_BY_KEYWORD, "expected a string field 'keyword'"),
            },
            GET_TABLE_DETAILS => match table_names_arg(args) {
                Some(names) => self.get_table_details(&names).await,
                None => invalid_arguments(
                    GET_TABLE_DETAILS,
                    "expected 'table_names' as an array of strings",
                ),
            },
            RUN_SQL_QUERY => match string_arg(args, "sql") {
                Some(sql) => self.run_sql_query(sql).await,
                None => invalid_arguments(RUN_SQL_QUERY, "expected a string field 'sql'"),
            },
            other => format!(
                "Unknown tool '{other}'. Available tools: {LIST_ALL_TABLES}, \
                 {SEARCH_TABLES_BY_KEYWORD}, {GET_TABLE_DETAILS}, {RUN_SQL_QUERY}."
            ),
        };

        tracing::info!(
            tool = %call.name,
            tool_call_id = %call.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            result_len = result.len(),
            "tool executed"
        );

        result
    }

    // ─── Tools ───────────────────────────────────────────────────────────

    /// Names of all tables in the configured schema.
    pub async fn list_all_tables(&self) -> String {
        let rows = match self.fetch(LIST_TABLES_SQL.to_string(), vec![json!(self.schema)]).await {
            Ok(rows) => rows,
            Err(e) => return format!("Failed to list tables: {e}"),
        };

        let tables: Vec<&str> = rows
            .iter()
            .filter_map(|r| r.get("table_name").and_then(Value::as_str))
            .collect();
        if tables.is_empty() {
            return format!("No tables found in schema '{}'.", self.schema);
        }
        format!("Tables in schema '{}': {}", self.schema, tables.join(", "))
    }

    /// `(table, column, comment)` entries matching `keyword` anywhere.
    pub async fn search_tables_by_keyword(&self, keyword: &str) -> String {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return invalid_arguments(SEARCH_TABLES_BY_KEYWORD, "keyword must not be empty");
        }

        let matches = match self.search_columns(keyword).await {
            Ok(found) => found,
            Err(e) => return format!("Failed to search tables: {e}"),
        };
        if matches.is_empty() {
            return format!("No tables or columns found matching keyword '{keyword}'.");
        }

        let mut out = format!("Found {} matching columns for '{keyword}':\n", matches.len());
        for col in &matches {
            out.push_str(&format!(
                "- table: {}, column: {} ({})\n",
                col.table_name,
                col.column_name,
                col.comment_or_placeholder()
            ));
        }
        out
    }

    /// Column listing for exactly the requested tables, as a JSON row-set.
    pub async fn get_table_details(&self, table_names: &[String]) -> String {
        let names = dedup_names(table_names);
        if names.is_empty() {
            return "No table names provided. Use list_all_tables or search_tables_by_keyword to \
                    find table names first."
                .to_string();
        }

        let columns = match self.describe_tables(&names).await {
            Ok(columns) => columns,
            Err(e) => return format!("Failed to read table details: {e}"),
        };
        if columns.is_empty() {
            return format!(
                "No columns found for tables: {}. Check the names with list_all_tables.",
                names.join(", ")
            );
        }

        match serde_json::to_string(&columns) {
            Ok(rendered) => rendered,
            Err(e) => format!("Failed to render table details: {e}"),
        }
    }

    /// Run a model-authored statement through the safety gate and the row cap.
    pub async fn run_sql_query(&self, sql: &str) -> String {
        if let SafetyVerdict::Denied(reason) = classify(sql) {
            tracing::warn!(reason = %reason, "rejected SQL statement");
            return format!(
                "Permission denied: {reason}. Only read-only SELECT or SHOW statements may be executed."
            );
        }

        if let Some(target) = show_target(sql) {
            if target.eq_ignore_ascii_case("TABLES") {
                return self.list_all_tables().await;
            }
            return format!(
                "SHOW {target} is not supported by this database. Use get_table_details for \
                 columns, or a SELECT statement."
            );
        }

        let outcome = match self.execute_bounded(sql).await {
            Ok(outcome) => outcome,
            Err(e) => return format!("SQL execution failed: {e}"),
        };
        if outcome.rows.is_empty() {
            return "Query succeeded but returned no rows.".to_string();
        }

        let mut rendered = match serde_json::to_string(&outcome.rows) {
            Ok(rendered) => rendered,
            Err(e) => return format!("Failed to render query result: {e}"),
        };
        if outcome.truncated {
            rendered.push_str(&format!("\n(Result truncated to the first {} rows.)", self.row_limit));
        }
        rendered
    }

    // ─── Internals ───────────────────────────────────────────────────────

    /// Matched in Rust rather than with SQLite's `lower()`, which only folds
    /// ASCII, so both sides go through the same Unicode lowercasing.
    async fn search_columns(&self, keyword: &str) -> Result<Vec<ColumnInfo>, DbToolError> {
        let sql = format!(
            "{CATALOG_CTE}
SELECT table_name, column_name, data_type, column_comment
FROM catalog
ORDER BY table_name, position"
        );
        let needle = keyword.to_lowercase();
        let rows = self.fetch(sql, vec![json!(self.schema)]).await?;
        Ok(rows
            .iter()
            .map(ColumnInfo::from_row)
            .filter(|col| col.matches(&needle))
            .collect())
    }

    /// One parameterized lookup across all `names`, reordered to match them.
    ///
    /// Names match with SQLite's own identifier rule: ASCII case-insensitive.
    async fn describe_tables(&self, names: &[String]) -> Result<Vec<ColumnInfo>, DbToolError> {
        let placeholders: Vec<String> = (0..names.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "{CATALOG_CTE}
SELECT table_name, column_name, data_type, column_comment
FROM catalog
WHERE table_name COLLATE NOCASE IN ({})
ORDER BY table_name, position",
            placeholders.join(", ")
        );

        let mut params = Vec::with_capacity(names.len() + 1);
        params.push(json!(self.schema));
        params.extend(names.iter().map(|n| json!(n)));

        let mut columns: Vec<ColumnInfo> = self
            .fetch(sql, params)
            .await?
            .iter()
            .map(ColumnInfo::from_row)
            .collect();
        columns.sort_by_key(|c| names.iter().position(|n| n.eq_ignore_ascii_case(&c.table_name)));
        Ok(columns)
    }

    async fn execute_bounded(&self, sql: &str) -> Result<QueryOutcome, DbToolError> {
        let statement = apply_row_limit(sql, self.row_limit);
        tracing::debug!(sql = %statement, "executing SQL");

        let mut rows = self
            .fetch_capped(statement, Vec::new(), Some(self.row_limit + 1))
            .await?;
        let truncated = rows.len() > self.row_limit;
        rows.truncate(self.row_limit);
        Ok(QueryOutcome { rows, truncated })
    }

    /// Borrow a connection and run one statement on the blocking pool.
    ///
    /// The guard moves into the blocking task, so it is returned when that
    /// task finishes even if this future is dropped first.
    async fn fetch(&self, sql: String, params: Vec<Value>) -> Result<Vec<Row>, DbToolError> {
        self.fetch_capped(sql, params, None).await
    }

    async fn fetch_capped(
        &self,
        sql: String,
        params: Vec<Value>,
        max_rows: Option<usize>,
    ) -> Result<Vec<Row>, DbToolError> {
        let mut conn = self.pool.acquire().await?;
        tokio::task::spawn_blocking(move || conn.execute(&sql, &params, max_rows)).await?
    }
}

#[async_trait]
impl ToolExecutor for ToolGateway {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tool_definitions()
    }

    async fn execute(&self, call: &ToolCall) -> String {
        self.dispatch(call).await
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn show_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*SHOW\s+(\w+)").expect("static regex"))
}

/// The object word of a `SHOW <object> ...` statement.
fn show_target(sql: &str) -> Option<&str> {
    show_statement()
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// What `apply_row_limit` needs to know about a statement's text.
struct StatementShape {
    /// End of the last token that is neither comment, whitespace nor `;`.
    code_end: usize,
    /// A `LIMIT` keyword outside quotes, comments and parentheses.
    has_top_level_limit: bool,
}

/// Single pass over `sql` that skips quoted text (`'..'`, `".."`, `` `..` ``,
/// `[..]`) and comments (`--`, `/* */`) and tracks parenthesis depth.
fn statement_shape(sql: &str) -> StatementShape {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let skip_to = |from: usize, close: u8| {
        bytes[from..]
            .iter()
            .position(|&b| b == close)
            .map_or(len, |p| from + p + 1)
    };
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80;

    let mut shape = StatementShape {
        code_end: 0,
        has_top_level_limit: false,
    };
    let mut depth = 0usize;
    let mut i = 0;
    while i < len {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => {
                i = skip_to(i + 1, b);
                shape.code_end = i;
            }
            b'[' => {
                i = skip_to(i + 1, b']');
                shape.code_end = i;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..].iter().position(|&c| c == b'\n').map_or(len, |p| i + p);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(len, |p| i + 2 + p + 2);
            }
            b';' => i += 1,
            _ if b.is_ascii_whitespace() => i += 1,
            _ if is_word(b) => {
                let start = i;
                while i < len && is_word(bytes[i]) {
                    i += 1;
                }
                if depth == 0 && sql[start..i].eq_ignore_ascii_case("limit") {
                    shape.has_top_level_limit = true;
                }
                shape.code_end = i;
            }
            _ => {
                match b {
                    b'(' => depth += 1,
                    b')' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                i += 1;
                shape.code_end = i;
            }
        }
    }
    shape
}

/// Drop trailing comments and semicolons, then append `LIMIT cap` to a SELECT
/// with no top-level LIMIT of its own. A LIMIT inside a subquery, a string
/// literal or a comment does not count.
pub fn apply_row_limit(sql: &str, cap: usize) -> String {
    let shape = statement_shape(sql);
    let statement = sql[..shape.code_end].trim();
    if is_select(statement) && !shape.has_top_level_limit {
        format!("{statement} LIMIT {cap}")
    } else {
        statement.to_string()
    }
}

/// Trimmed, non-empty names with duplicates removed, ignoring ASCII case
/// (first occurrence wins).
fn dedup_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
            out.push(name.to_string());
        }
    }
    out
}

fn string_arg<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str)
}

/// `table_names` as an array of strings; a lone string is accepted as one name.
fn table_names_arg(args: &Value) -> Option<Vec<String>> {
    match args.get("table_names")? {
        Value::String(name) => Some(vec![name.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn invalid_arguments(tool: &str, reason: &str) -> String {
    format!("Invalid arguments for '{tool}': {reason}.")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_tools::backend::{BackendConnection, ConnectionFactory, SqliteConnectionFactory};
    use crate::db_tools::pool::PoolConfig;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps the SQLite factory to count opened connections and the rows the
    /// backend hands back for the latest statement.
    struct CountingFactory {
        inner: SqliteConnectionFactory,
        opened: AtomicUsize,
        last_rows: Arc<AtomicUsize>,
    }

    struct CountingConnection {
        inner: Box<dyn BackendConnection>,
        last_rows: Arc<AtomicUsize>,
    }

    impl BackendConnection for CountingConnection {
        fn execute(
            &mut self,
            sql: &str,
            params: &[Value],
            max_rows: Option<usize>,
        ) -> Result<Vec<Row>, DbToolError> {
            let rows = self.inner.execute(sql, params, max_rows)?;
            self.last_rows.store(rows.len(), Ordering::SeqCst);
            Ok(rows)
        }

        fn is_alive(&mut self) -> bool {
            self.inner.is_alive()
        }
    }

    impl ConnectionFactory for CountingFactory {
        fn connect(&self) -> Result<Box<dyn BackendConnection>, DbToolError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingConnection {
                inner: self.inner.connect()?,
                last_rows: Arc::clone(&self.last_rows),
            }))
        }

        fn target(&self) -> String {
            self.inner.target()
        }
    }

    fn seed(path: &Path) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, email TEXT, update_time TEXT);
             CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, total REAL, status TEXT, note TEXT);
             CREATE TABLE products (sku TEXT PRIMARY KEY, title TEXT);
             INSERT INTO customers VALUES (1, 'Ada', 'ada@example.com', '2024-01-01');",
        )
        .unwrap();
        for i in 1..=150 {
            conn.execute(
                "INSERT INTO orders (id, customer_id, total, status) VALUES (?1, 1, ?2, 'paid')",
                rusqlite::params![i, i as f64 * 1.5],
            )
            .unwrap();
        }
    }

    fn gateway_with_counter(path: &Path) -> (ToolGateway, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            inner: SqliteConnectionFactory::new(path),
            opened: AtomicUsize::new(0),
            last_rows: Arc::new(AtomicUsize::new(0)),
        });
        let config = PoolConfig {
            min: 0,
            max: 2,
            ..PoolConfig::default()
        };
        let pool = ConnectionPool::new(factory.clone(), config).unwrap();
        (ToolGateway::new(pool, "main", DEFAULT_ROW_LIMIT), factory)
    }

    fn fixture() -> (tempfile::TempDir, ToolGateway, Arc<CountingFactory>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        seed(&path);
        let (gateway, factory) = gateway_with_counter(&path);
        (dir, gateway, factory)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_list_all_tables() {
        let (_dir, gateway, _) = fixture();
        let out = gateway.list_all_tables().await;
        assert_eq!(out, "Tables in schema 'main': customers, orders, products");
    }

    #[tokio::test]
    async fn test_list_all_tables_empty_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 1;")
            .unwrap();
        let (gateway, _) = gateway_with_counter(&path);

        assert_eq!(gateway.list_all_tables().await, "No tables found in schema 'main'.");
    }

    #[tokio::test]
    async fn test_keyword_search_case_insensitive() {
        let (_dir, gateway, _) = fixture();
        let out = gateway.search_tables_by_keyword("CUSTOMER").await;
        assert!(out.starts_with("Found "));
        assert!(out.contains("table: customers, column: email (no comment)"));
        assert!(out.contains("table: orders, column: customer_id (no comment)"));
        assert!(!out.contains("products"));
    }

    #[tokio::test]
    async fn test_keyword_search_no_match_and_wildcards_literal() {
        let (_dir, gateway, _) = fixture();
        assert_eq!(
            gateway.search_tables_by_keyword("invoice").await,
            "No tables or columns found matching keyword 'invoice'."
        );
        // '%' would match everything if it were not escaped.
        assert_eq!(
            gateway.search_tables_by_keyword("%").await,
            "No tables or columns found matching keyword '%'."
        );
        // '_' is literal: only columns that really contain an underscore match.
        let out = gateway.search_tables_by_keyword("_").await;
        assert!(out.contains("update_time"));
        assert!(!out.contains("column: email"));
    }

    #[tokio::test]
    async fn test_keyword_search_non_ascii_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obst.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE Äpfel (Sorte TEXT, Größe INTEGER);")
            .unwrap();
        let (gateway, _) = gateway_with_counter(&path);

        for keyword in ["Äpfel", "äpfel", "ÄPFEL"] {
            let out = gateway.search_tables_by_keyword(keyword).await;
            assert!(out.starts_with("Found 2 matching columns"), "{keyword}: {out}");
            assert!(out.contains("table: Äpfel, column: Sorte"));
        }
        let out = gateway.search_tables_by_keyword("GRÖSSE").await;
        assert!(out.starts_with("No tables or columns found"), "{out}");
        let out = gateway.search_tables_by_keyword("GRÖ").await;
        assert!(out.contains("column: Größe"), "{out}");
    }

    #[tokio::test]
    async fn test_keyword_search_empty_keyword() {
        let (_dir, gateway, _) = fixture();
        let out = gateway.search_tables_by_keyword("  ").await;
        assert!(out.starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_table_details_requested_order_and_dedup() {
        let (_dir, gateway, _) = fixture();
        let names = vec!["orders".to_string(), "customers".to_string(), "orders".to_string()];
        let out = gateway.get_table_details(&names).await;

        let rows: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0]["table_name"], "orders");
        assert_eq!(rows[0]["column_name"], "id");
        assert_eq!(rows[1]["column_name"], "customer_id");
        assert_eq!(rows[5]["table_name"], "customers");
        assert_eq!(rows[2]["data_type"], "REAL");
        assert!(rows[0]["column_comment"].is_null());
    }

    #[tokio::test]
    async fn test_table_details_ignore_ascii_case() {
        let (_dir, gateway, _) = fixture();
        let names = vec!["Products".to_string(), "ORDERS".to_string(), "orders".to_string()];
        let out = gateway.get_table_details(&names).await;

        let rows: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0]["table_name"], "products");
        assert_eq!(rows[0]["column_name"], "sku");
        assert_eq!(rows[2]["table_name"], "orders");
    }

    #[tokio::test]
    async fn test_table_details_empty_inputs() {
        let (_dir, gateway, factory) = fixture();
        let out = gateway.get_table_details(&[]).await;
        assert!(out.starts_with("No table names provided"));
        assert_eq!(factory.opened.load(Ordering::SeqCst), 0);

        let out = gateway.get_table_details(&["ghost".to_string()]).await;
        assert_eq!(
            out,
            "No columns found for tables: ghost. Check the names with list_all_tables."
        );
    }

    #[tokio::test]
    async fn test_unbounded_select_gets_row_cap() {
        let (_dir, gateway, _) = fixture();
        let out = gateway.run_sql_query("SELECT * FROM orders;").await;
        let rows: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[0]["status"], "paid");
    }

    #[tokio::test]
    async fn test_row_cap_survives_comments_literals_and_subqueries() {
        let (_dir, gateway, factory) = fixture();
        for sql in [
            "SELECT * FROM orders -- all of them",
            "SELECT * FROM orders /* no limit here */",
            "SELECT * FROM orders WHERE status <> 'limit'",
            "SELECT * FROM orders WHERE id IN (SELECT id FROM orders LIMIT 140)",
        ] {
            let out = gateway.run_sql_query(sql).await;
            let rows: Vec<Value> = serde_json::from_str(&out).unwrap_or_else(|e| panic!("{sql}: {e}: {out}"));
            assert_eq!(rows.len(), 100, "{sql}");
            assert_eq!(factory.last_rows.load(Ordering::SeqCst), 100, "{sql}");
        }
    }

    #[tokio::test]
    async fn test_explicit_limit_respected_and_oversize_truncated() {
        let (_dir, gateway, factory) = fixture();
        let out = gateway.run_sql_query("select id from orders limit 5").await;
        let rows: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.len(), 5);

        let out = gateway.run_sql_query("SELECT id FROM orders LIMIT 500").await;
        let (json_part, note) = out.split_once('\n').unwrap();
        let rows: Vec<Value> = serde_json::from_str(json_part).unwrap();
        assert_eq!(rows.len(), 100);
        assert_eq!(note, "(Result truncated to the first 100 rows.)");
        // The backend stops one row past the cap instead of reading all 150.
        assert_eq!(factory.last_rows.load(Ordering::SeqCst), 101);
    }

    #[tokio::test]
    async fn test_show_tables_lists_catalog() {
        let (_dir, gateway, _) = fixture();
        assert_eq!(
            gateway.run_sql_query("show tables;").await,
            "Tables in schema 'main': customers, orders, products"
        );

        let out = gateway.run_sql_query("SHOW COLUMNS FROM orders").await;
        assert!(out.starts_with("SHOW COLUMNS is not supported"), "{out}");
    }

    #[tokio::test]
    async fn test_denied_query_never_borrows() {
        let (_dir, gateway, factory) = fixture();
        let out = gateway.run_sql_query("DROP TABLE orders").await;
        assert!(out.starts_with("Permission denied:"));
        let out = gateway
            .run_sql_query("select * from orders; delete from orders")
            .await;
        assert!(out.starts_with("Permission denied: forbidden keyword 'DELETE'"));
        assert_eq!(factory.opened.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.pool().status().in_use, 0);

        gateway.run_sql_query("SELECT 1").await;
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_rows_and_backend_failure_rendered() {
        let (_dir, gateway, _) = fixture();
        assert_eq!(
            gateway.run_sql_query("SELECT * FROM orders WHERE id < 0").await,
            "Query succeeded but returned no rows."
        );

        let out = gateway.run_sql_query("SELECT * FROM missing_table").await;
        assert!(out.starts_with("SQL execution failed:"));
        assert!(out.contains("missing_table"));
        assert_eq!(gateway.pool().status().in_use, 0);
    }

    #[tokio::test]
    async fn test_dispatch_routes_and_validates() {
        let (_dir, gateway, _) = fixture();

        let out = gateway.dispatch(&call(LIST_ALL_TABLES, json!({}))).await;
        assert!(out.contains("orders"));

        let out = gateway
            .dispatch(&call(GET_TABLE_DETAILS, json!({"table_names": "products"})))
            .await;
        assert!(out.contains("\"sku\""));

        let out = gateway
            .dispatch(&call(RUN_SQL_QUERY, Value::String("{sql: broken".to_string())))
            .await;
        assert_eq!(out, "Invalid arguments for 'run_sql_query': expected a string field 'sql'.");

        let out = gateway
            .dispatch(&call(GET_TABLE_DETAILS, json!({"table_names": [1, 2]})))
            .await;
        assert!(out.starts_with("Invalid arguments for 'get_table_details'"));

        let out = gateway.dispatch(&call("drop_everything", json!({}))).await;
        assert!(out.starts_with("Unknown tool 'drop_everything'"));
    }

    #[test]
    fn test_tool_definitions_cover_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        seed(&path);
        let (gateway, _) = gateway_with_counter(&path);
        let names: Vec<String> = gateway
            .tool_definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(
            names,
            vec![LIST_ALL_TABLES, SEARCH_TABLES_BY_KEYWORD, GET_TABLE_DETAILS, RUN_SQL_QUERY]
        );
    }

    #[test]
    fn test_apply_row_limit() {
        assert_eq!(apply_row_limit("SELECT * FROM orders", 100), "SELECT * FROM orders LIMIT 100");
        assert_eq!(apply_row_limit("SELECT * FROM orders ; ", 10), "SELECT * FROM orders LIMIT 10");
        assert_eq!(apply_row_limit("select 1 limit 3", 10), "select 1 limit 3");
        assert_eq!(
            apply_row_limit("SELECT a FROM t UNION SELECT b FROM u LIMIT 5;", 10),
            "SELECT a FROM t UNION SELECT b FROM u LIMIT 5"
        );
        assert_eq!(apply_row_limit("SHOW TABLES", 10), "SHOW TABLES");
    }

    #[test]
    fn test_apply_row_limit_ignores_non_clause_limits() {
        assert_eq!(
            apply_row_limit("SELECT * FROM posts -- all of them\n", 100),
            "SELECT * FROM posts LIMIT 100"
        );
        assert_eq!(
            apply_row_limit("SELECT * FROM posts /* limit later */ ;", 100),
            "SELECT * FROM posts LIMIT 100"
        );
        assert_eq!(
            apply_row_limit("SELECT * FROM posts WHERE body = 'no limit'", 100),
            "SELECT * FROM posts WHERE body = 'no limit' LIMIT 100"
        );
        assert_eq!(
            apply_row_limit(r#"SELECT "limit", [Limit] FROM t"#, 7),
            r#"SELECT "limit", [Limit] FROM t LIMIT 7"#
        );
        assert_eq!(
            apply_row_limit("SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT 3)", 7),
            "SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT 3) LIMIT 7"
        );
        assert_eq!(
            apply_row_limit("SELECT 'Größe' AS größe FROM t -- ünïcode", 7),
            "SELECT 'Größe' AS größe FROM t LIMIT 7"
        );
    }
}
