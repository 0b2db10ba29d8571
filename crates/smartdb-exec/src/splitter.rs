//! Line-based SQL statement splitting.
//!
//! Statements end at a line whose trimmed text ends with `;`. Semicolons in
//! string literals or inside `/* ... */` blocks are not recognized and will
//! split a statement early.

/// Split a script into statements, dropping blank and `--` / `#` comment lines.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.split('\n') {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") || line.starts_with('#') {
            continue;
        }

        current.push(' ');
        current.push_str(line);

        if line.ends_with(';') {
            statements.push(current.trim().to_string());
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}
