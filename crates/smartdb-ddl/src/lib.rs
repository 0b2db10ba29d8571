//! SQL DDL synthesis for SmartDB
//!
//! Maps a [`SchemaDescription`] onto SQL DDL text:
//! - entities -> `CREATE TABLE` (with a composite `PRIMARY KEY` clause),
//! - many-to-many -> junction table with two foreign keys,
//! - many-to-one / one-to-one -> `ALTER TABLE` column + foreign key,
//! - one-to-many -> nothing (known gap, kept as-is).
//!
//! Output is a pure function of the input: identical descriptions always
//! render byte-identical text. No reference checking happens here; a
//! relationship naming a missing entity renders dangling SQL.

use smartdb_schema::{Entity, Relationship, RelationshipType, SchemaDescription};
use std::fmt::Write as _;

/// Header used for DDL derived from an uploaded ER diagram.
pub const ER_DIAGRAM_HEADER: &str = "SQL Generated from ER Diagram";

/// Render `schema` with no header.
pub fn synthesize(schema: &SchemaDescription) -> String {
    DdlSynthesizer::new().synthesize(schema)
}

#[derive(Debug, Clone, Default)]
pub struct DdlSynthesizer {
    header: Option<String>,
}

impl DdlSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix the output with `-- <header>` and a blank line.
    pub fn with_header(mut self, header: &str) -> Self {
        self.header = Some(header.to_string());
        self
    }

    pub fn synthesize(&self, schema: &SchemaDescription) -> String {
        let mut out = String::new();
        if let Some(header) = &self.header {
            let _ = write!(out, "-- {header}\n\n");
        }
        for entity in &schema.entities {
            out.push_str(&create_table(entity));
        }
        for rel in &schema.relationships {
            out.push_str(&relationship_ddl(rel));
        }
        out
    }
}

/// `CREATE TABLE` for one entity.
pub fn create_table(entity: &Entity) -> String {
    let mut lines: Vec<String> = entity
        .attributes
        .iter()
        .map(|attr| {
            let mut column = format!("    {} {}", attr.name, attr.data_type);
            if !attr.is_nullable {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();

    let primary_key = entity.primary_key();
    if !primary_key.is_empty() {
        lines.push(format!("    PRIMARY KEY ({})", primary_key.join(", ")));
    }

    format!("CREATE TABLE {} (\n{}\n);\n\n", entity.name, lines.join(",\n"))
}

/// DDL implementing one relationship; empty for one-to-many.
pub fn relationship_ddl(rel: &Relationship) -> String {
    let (e1, e2) = (rel.entity1.as_str(), rel.entity2.as_str());
    match rel.kind {
        RelationshipType::ManyToMany => {
            let mut sql = String::new();
            let _ = writeln!(sql, "CREATE TABLE {e1}_{e2} (");
            let _ = writeln!(sql, "    {e1}_id INTEGER NOT NULL,");
            let _ = writeln!(sql, "    {e2}_id INTEGER NOT NULL,");
            let _ = writeln!(sql, "    PRIMARY KEY ({e1}_id, {e2}_id),");
            let _ = writeln!(sql, "    FOREIGN KEY ({e1}_id) REFERENCES {e1} (id),");
            let _ = writeln!(sql, "    FOREIGN KEY ({e2}_id) REFERENCES {e2} (id)");
            sql.push_str(");\n\n");
            sql
        }
        RelationshipType::ManyToOne => foreign_key_column(
            &format!("-- Add foreign key to implement {e1} to {e2} relationship"),
            e1,
            e2,
            "INTEGER",
        ),
        RelationshipType::OneToOne => foreign_key_column(
            "-- Add foreign key with unique constraint for one-to-one relationship",
            e1,
            e2,
            "INTEGER UNIQUE",
        ),
        RelationshipType::OneToMany => String::new(),
    }
}

fn foreign_key_column(comment: &str, e1: &str, e2: &str, column_type: &str) -> String {
    let mut sql = String::new();
    let _ = writeln!(sql, "{comment}");
    let _ = writeln!(sql, "ALTER TABLE {e1} ADD COLUMN {e2}_id {column_type};");
    let _ = writeln!(
        sql,
        "ALTER TABLE {e1} ADD FOREIGN KEY ({e2}_id) REFERENCES {e2} (id);"
    );
    sql.push('\n');
    sql
}
