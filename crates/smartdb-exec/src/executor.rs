use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use tempfile::TempPath;

use crate::error::{classify_sql_error, ExecError, SqlErrorInfo};
use crate::introspect::{read_schema, DatabaseSchema};
use crate::splitter::split_sql_statements;
use crate::DbEngine;

const PREVIEW_CHARS: usize = 50;

/// Rows returned by one `SELECT`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Outcome of one [`SqlExecutor::execute`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    pub log: Vec<String>,
    pub results: Vec<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SqlErrorInfo>,
}

impl ExecutionResult {
    fn failure(message: String, log: Vec<String>) -> Self {
        let error = Some(classify_sql_error(&message));
        Self {
            success: false,
            message,
            log,
            results: Vec::new(),
            error,
        }
    }

    /// The log as one newline-joined block.
    pub fn log_text(&self) -> String {
        self.log.join("\n")
    }
}

/// Owns at most one live SQLite connection.
///
/// Without an explicit database name the connection is backed by a fresh
/// temporary file, deleted again by [`SqlExecutor::disconnect`] (and on drop).
#[derive(Debug)]
pub struct SqlExecutor {
    engine: DbEngine,
    conn: Option<Connection>,
    temp_db: Option<TempPath>,
}

impl Default for SqlExecutor {
    fn default() -> Self {
        Self::new(DbEngine::default())
    }
}

impl SqlExecutor {
    pub fn new(engine: DbEngine) -> Self {
        Self {
            engine,
            conn: None,
            temp_db: None,
        }
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Path of the temporary database file, if this connection owns one.
    pub fn temp_db_path(&self) -> Option<&Path> {
        self.temp_db.as_deref()
    }

    /// Open a connection, replacing any existing one.
    ///
    /// `name` selects a persistent database file; `None` creates a temporary one.
    pub fn try_connect(&mut self, name: Option<&Path>) -> Result<(), ExecError> {
        self.disconnect();

        let (conn, temp_db) = match self.engine {
            DbEngine::Sqlite => match name {
                Some(path) => (Connection::open(path)?, None),
                None => {
                    let temp = tempfile::Builder::new()
                        .prefix("smartdb_")
                        .suffix(".db")
                        .tempfile()?
                        .into_temp_path();
                    (Connection::open(&temp)?, Some(temp))
                }
            },
        };
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        tracing::debug!(
            path = ?name.or(temp_db.as_deref()),
            temporary = temp_db.is_some(),
            "opened database"
        );
        self.conn = Some(conn);
        self.temp_db = temp_db;
        Ok(())
    }

    /// [`Self::try_connect`], reporting failure as `false` and logging the cause.
    pub fn connect(&mut self, name: Option<&Path>) -> bool {
        match self.try_connect(name) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "error connecting to database");
                false
            }
        }
    }

    /// Close the connection and delete the temporary file. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                tracing::warn!(error = %err, "failed to close database connection");
            }
        }
        if let Some(temp) = self.temp_db.take() {
            let path = temp.to_path_buf();
            if let Err(err) = temp.close() {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to remove temporary database"
                );
            }
        }
    }

    /// Run `sql` statement by statement inside one transaction.
    ///
    /// Stops at the first failing statement and rolls everything back;
    /// commits once when every statement succeeded.
    pub fn execute(&mut self, sql: &str) -> ExecutionResult {
        if self.conn.is_none() && !self.connect(None) {
            return ExecutionResult::failure("Failed to connect to database".to_string(), Vec::new());
        }
        let Some(conn) = self.conn.as_mut() else {
            return ExecutionResult::failure("Failed to connect to database".to_string(), Vec::new());
        };

        let statements = split_sql_statements(sql);
        let mut log = Vec::new();
        let mut results = Vec::new();

        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(err) => return ExecutionResult::failure(err.to_string(), log),
        };

        for stmt in &statements {
            let preview = preview(stmt);
            match transaction_control(stmt) {
                Some(TxControl::BeginOrCommit) => {
                    log.push(format!("Successfully executed: {preview}"));
                    continue;
                }
                Some(TxControl::Rollback) => {
                    let message =
                        "Script requested ROLLBACK; no changes were applied".to_string();
                    log.push(format!("Error executing statement: {preview}"));
                    log.push(format!("Error message: {message}"));
                    if let Err(rollback_err) = tx.rollback() {
                        tracing::warn!(error = %rollback_err, "rollback failed");
                    }
                    return ExecutionResult::failure(message, log);
                }
                None => {}
            }
            match run_statement(&tx, stmt) {
                Ok(Some(result)) => {
                    log.push(format!("Successfully executed: {preview}"));
                    log.push(format!("Retrieved {} rows", result.rows.len()));
                    results.push(result);
                }
                Ok(None) => log.push(format!("Successfully executed: {preview}")),
                Err(err) => {
                    log.push(format!("Error executing statement: {preview}"));
                    log.push(format!("Error message: {err}"));
                    if let Err(rollback_err) = tx.rollback() {
                        tracing::warn!(error = %rollback_err, "rollback failed");
                    }
                    tracing::debug!(statement = %preview, error = %err, "script aborted");
                    return ExecutionResult::failure(err.to_string(), log);
                }
            }
        }

        if let Err(err) = tx.commit() {
            log.push(format!("Error message: {err}"));
            return ExecutionResult::failure(err.to_string(), log);
        }

        tracing::debug!(statements = statements.len(), "script committed");
        ExecutionResult {
            success: true,
            message: "SQL execution completed successfully".to_string(),
            log,
            results,
            error: None,
        }
    }

    /// Tables, columns and foreign keys of the connected database.
    pub fn get_schema(&self) -> Result<DatabaseSchema, ExecError> {
        let conn = self.conn.as_ref().ok_or(ExecError::NotConnected)?;
        Ok(read_schema(conn)?)
    }
}

impl Drop for SqlExecutor {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn is_select(stmt: &str) -> bool {
    stmt.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn preview(stmt: &str) -> String {
    let mut chars = stmt.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Transaction control statements in a script; the executor owns the real
/// transaction, so these never reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxControl {
    BeginOrCommit,
    Rollback,
}

fn transaction_control(stmt: &str) -> Option<TxControl> {
    let words: Vec<String> = stmt
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect();
    let (head, rest) = words.split_first()?;

    const MODES: [&str; 3] = ["DEFERRED", "IMMEDIATE", "EXCLUSIVE"];
    let bare =
        |words: &[String]| matches!(words, [] | [_]) && words.iter().all(|w| w == "TRANSACTION");
    match head.as_str() {
        "BEGIN" => {
            let rest = match rest.split_first() {
                Some((mode, tail)) if MODES.contains(&mode.as_str()) => tail,
                _ => rest,
            };
            bare(rest).then_some(TxControl::BeginOrCommit)
        }
        "COMMIT" | "END" if bare(rest) => Some(TxControl::BeginOrCommit),
        // `ROLLBACK TO <savepoint>` stays a plain statement.
        "ROLLBACK" if bare(rest) => Some(TxControl::Rollback),
        _ => None,
    }
}

/// A statement with nothing but terminators, e.g. a lone `;` line.
fn is_empty_statement(stmt: &str) -> bool {
    stmt.chars().all(|c| c == ';' || c.is_whitespace())
}

fn run_statement(conn: &Connection, stmt: &str) -> rusqlite::Result<Option<QueryResult>> {
    if is_empty_statement(stmt) {
        return Ok(None);
    }
    let mut prepared = conn.prepare(stmt)?;

    if !is_select(stmt) {
        let mut rows = prepared.query([])?;
        while rows.next()?.is_some() {}
        return Ok(None);
    }

    let columns: Vec<String> = prepared
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = columns.len();

    let mut out = Vec::new();
    let mut rows = prepared.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(value_to_json(row.get_ref(idx)?));
        }
        out.push(values);
    }

    Ok(Some(QueryResult { columns, rows: out }))
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            serde_json::Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
    }
}
