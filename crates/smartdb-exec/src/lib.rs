//! SQL execution for SmartDB
//!
//! A [`SqlExecutor`] owns at most one SQLite connection, either to a
//! caller-named file or to a temporary file that is removed on disconnect.
//! Scripts are split with a deliberately naive line splitter and run inside
//! a single explicit transaction: one failing statement rolls back the
//! whole script.
//!
//! The live schema can be read back through [`SqlExecutor::get_schema`] and
//! turned into a node/edge graph with [`SchemaGraph::from_schema`].

pub mod error;
pub mod executor;
pub mod graph;
pub mod introspect;
pub mod splitter;

pub use error::{classify_sql_error, ExecError, SqlErrorInfo, SqlErrorKind};
pub use executor::{ExecutionResult, QueryResult, SqlExecutor};
pub use graph::{GraphColumn, GraphEdge, GraphNode, SchemaGraph};
pub use introspect::{ColumnInfo, DatabaseSchema, ForeignKeyInfo, TableInfo};
pub use splitter::split_sql_statements;

/// Supported database engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbEngine {
    #[default]
    Sqlite,
}

impl DbEngine {
    pub fn parse(s: &str) -> Result<Self, ExecError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "sqlite" => Ok(Self::Sqlite),
            _ => Err(ExecError::EngineNotImplemented(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for DbEngine {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_parse() {
        assert_eq!(DbEngine::parse("sqlite").unwrap(), DbEngine::Sqlite);
        assert_eq!(DbEngine::parse("SQLite").unwrap(), DbEngine::Sqlite);
        let err = DbEngine::parse("postgres").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Database engine postgres not implemented yet"
        );
    }
}
