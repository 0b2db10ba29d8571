//! Identifier and type helpers for model-produced schema descriptions.

use regex::Regex;
use std::sync::OnceLock;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w]").expect("static regex"))
}

fn timestamp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").expect("static regex"))
}

fn date_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("static regex"))
}

fn sanitize_identifier(name: &str, digit_prefix: &str) -> String {
    let name = non_word().replace_all(name.trim(), "_").to_lowercase();
    match name.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("{digit_prefix}{name}"),
        _ => name,
    }
}

/// Replace every non-word character with `_` and lowercase; names starting
/// with a digit get a `t_` prefix.
pub fn sanitize_table_name(name: &str) -> String {
    sanitize_identifier(name, "t_")
}

/// Column counterpart of [`sanitize_table_name`] (`c_` prefix).
pub fn sanitize_column_name(name: &str) -> String {
    sanitize_identifier(name, "c_")
}

/// Guess a SQL type from a sample JSON value.
pub fn infer_sql_type(sample: &serde_json::Value) -> &'static str {
    match sample {
        serde_json::Value::Bool(_) => "BOOLEAN",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
        serde_json::Value::Number(_) => "REAL",
        serde_json::Value::String(s) if timestamp_prefix().is_match(s) => "TIMESTAMP",
        serde_json::Value::String(s) if date_prefix().is_match(s) => "DATE",
        _ => "TEXT",
    }
}
