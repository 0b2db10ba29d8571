//! Executor errors and classification of engine error messages.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Database engine {0} not implemented yet")]
    EngineNotImplemented(String),
    #[error("Not connected to a database")]
    NotConnected,
    #[error("failed to create temporary database: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse category of a failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "constraint", rename_all = "snake_case")]
pub enum SqlErrorKind {
    ConstraintViolation(Constraint),
    SyntaxError,
    UnknownError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Unique,
    ForeignKey,
    NotNull,
}

/// An engine error message plus its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlErrorInfo {
    pub message: String,
    #[serde(flatten)]
    pub kind: SqlErrorKind,
    pub fix_suggestion: &'static str,
}

const KNOWN_ERRORS: &[(&str, SqlErrorKind, &str)] = &[
    (
        "UNIQUE constraint failed",
        SqlErrorKind::ConstraintViolation(Constraint::Unique),
        "Ensure values in the specified column are unique",
    ),
    (
        "FOREIGN KEY constraint failed",
        SqlErrorKind::ConstraintViolation(Constraint::ForeignKey),
        "Ensure referenced values exist in the parent table",
    ),
    (
        "NOT NULL constraint failed",
        SqlErrorKind::ConstraintViolation(Constraint::NotNull),
        "Provide a non-NULL value for the specified column",
    ),
    (
        "syntax error",
        SqlErrorKind::SyntaxError,
        "Check SQL syntax for errors",
    ),
];

/// Pattern-match an engine message into a [`SqlErrorInfo`].
pub fn classify_sql_error(message: &str) -> SqlErrorInfo {
    let (kind, fix_suggestion) = KNOWN_ERRORS
        .iter()
        .find(|(pattern, _, _)| message.contains(pattern))
        .map(|(_, kind, fix)| (*kind, *fix))
        .unwrap_or((
            SqlErrorKind::UnknownError,
            "Review the SQL and database schema",
        ));

    SqlErrorInfo {
        message: message.to_string(),
        kind,
        fix_suggestion,
    }
}
