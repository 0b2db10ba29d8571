//! Executor behaviour against temporary and persistent databases.

use smartdb_exec::{DbEngine, SqlErrorKind, SqlExecutor};
use tempfile::tempdir;

#[test]
fn test_get_schema_reports_keys_and_nullability() {
    let mut exec = SqlExecutor::new(DbEngine::Sqlite);
    let result = exec.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);");
    assert!(result.success, "{}", result.message);

    let schema = exec.get_schema().expect("schema");
    assert_eq!(schema.tables.len(), 1);

    let users = schema.table("users").expect("users table");
    assert_eq!(users.columns.len(), 2);
    let id = users.column("id").unwrap();
    assert!(id.is_primary_key);
    assert_eq!(id.data_type, "INTEGER");
    let name = users.column("name").unwrap();
    assert!(name.not_null);
    assert!(!name.is_primary_key);
    assert!(users.foreign_keys.is_empty());
}

#[test]
fn test_foreign_keys_in_declaration_order() {
    let mut exec = SqlExecutor::default();
    let result = exec.execute(
        "CREATE TABLE a (id INTEGER PRIMARY KEY);\n\
         CREATE TABLE b (id INTEGER PRIMARY KEY);\n\
         CREATE TABLE a_b (\n\
             a_id INTEGER NOT NULL,\n\
             b_id INTEGER NOT NULL,\n\
             PRIMARY KEY (a_id, b_id),\n\
             FOREIGN KEY (a_id) REFERENCES a (id) ON DELETE CASCADE,\n\
             FOREIGN KEY (b_id) REFERENCES b (id)\n\
         );",
    );
    assert!(result.success, "{}", result.message);

    let schema = exec.get_schema().unwrap();
    let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "a_b"]);

    let junction = schema.table("a_b").unwrap();
    assert_eq!(junction.foreign_keys.len(), 2);
    let to_a = junction
        .foreign_keys
        .iter()
        .find(|fk| fk.referenced_table == "a")
        .unwrap();
    assert_eq!(to_a.from_column, "a_id");
    assert_eq!(to_a.to_column.as_deref(), Some("id"));
    assert_eq!(to_a.on_delete, "CASCADE");
    assert_eq!(to_a.on_update, "NO ACTION");
    assert!(junction.columns.iter().all(|c| c.is_primary_key));
}

#[test]
fn test_failed_script_leaves_persistent_database_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shop.db");

    let mut exec = SqlExecutor::default();
    assert!(exec.connect(Some(&path)));
    let result = exec.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
         INSERT INTO users (id, name) VALUES (1, NULL);",
    );
    assert!(!result.success);
    assert_eq!(result.log.len(), 3);
    assert!(result.log[0].starts_with("Successfully executed: CREATE TABLE users"));
    assert!(result.log[1].starts_with("Error executing statement: INSERT INTO users"));
    assert!(matches!(
        result.error.as_ref().map(|e| e.kind),
        Some(SqlErrorKind::ConstraintViolation(_))
    ));
    exec.disconnect();
    assert!(path.exists(), "persistent database must survive disconnect");

    let mut reopened = SqlExecutor::default();
    assert!(reopened.connect(Some(&path)));
    assert!(reopened.get_schema().unwrap().tables.is_empty());
}

#[test]
fn test_committed_script_survives_reconnect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kept.db");

    {
        let mut exec = SqlExecutor::default();
        assert!(exec.connect(Some(&path)));
        let result = exec.execute(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT DEFAULT 'empty');\n\
             INSERT INTO notes (id) VALUES (7);",
        );
        assert!(result.success, "{}", result.message);
    }

    let mut exec = SqlExecutor::default();
    assert!(exec.connect(Some(&path)));
    let schema = exec.get_schema().unwrap();
    let body = schema.table("notes").unwrap().column("body").unwrap();
    assert_eq!(body.default_value.as_deref(), Some("'empty'"));

    let result = exec.execute("SELECT id, body FROM notes;");
    assert!(result.success);
    assert_eq!(
        result.results[0].rows,
        vec![vec![serde_json::json!(7), serde_json::json!("empty")]]
    );
}

#[test]
fn test_connect_to_unreachable_path_reports_false() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("nested").join("x.db");

    let mut exec = SqlExecutor::default();
    assert!(!exec.connect(Some(&path)));
    assert!(!exec.is_connected());
}

#[test]
fn test_reconnect_replaces_temporary_database() {
    let mut exec = SqlExecutor::default();
    assert!(exec.connect(None));
    let first = exec.temp_db_path().unwrap().to_path_buf();
    assert!(exec.execute("CREATE TABLE t (x INTEGER);").success);

    assert!(exec.connect(None));
    let second = exec.temp_db_path().unwrap().to_path_buf();
    assert_ne!(first, second);
    assert!(!first.exists());
    assert!(exec.get_schema().unwrap().tables.is_empty());
}

#[test]
fn test_syntax_error_is_classified() {
    let mut exec = SqlExecutor::default();
    let result = exec.execute("SELEC 1;");
    assert!(!result.success);
    let info = result.error.expect("classified error");
    assert_eq!(info.kind, SqlErrorKind::SyntaxError);
    assert_eq!(info.fix_suggestion, "Check SQL syntax for errors");
}
