//! Property-based tests for DDL synthesis
//!
//! 1. Column clauses match attributes one-to-one
//! 2. A primary-key clause appears iff some attribute is a key
//! 3. Output is deterministic
//! 4. Entity and junction-table DDL parses as SQLite

use proptest::prelude::*;
use smartdb_ddl::{create_table, synthesize};
use smartdb_schema::{Attribute, Entity, Relationship, RelationshipType, SchemaDescription};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

// ============================================================================
// Strategies
// ============================================================================

fn sql_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("INTEGER".to_string()),
        Just("TEXT".to_string()),
        Just("REAL".to_string()),
        Just("BLOB".to_string()),
    ]
}

fn attribute_strategy() -> impl Strategy<Value = Attribute> {
    ("c_[a-z]{1,8}", sql_type_strategy(), any::<bool>(), any::<bool>()).prop_map(
        |(name, data_type, is_primary_key, is_nullable)| Attribute {
            is_primary_key,
            is_nullable,
            ..Attribute::new(&name, &data_type)
        },
    )
}

fn entity_strategy() -> impl Strategy<Value = Entity> {
    ("t_[a-z]{1,8}", prop::collection::vec(attribute_strategy(), 1..8))
        .prop_map(|(name, attributes)| Entity::new(&name, attributes))
}

fn schema_strategy() -> impl Strategy<Value = SchemaDescription> {
    prop::collection::vec(entity_strategy(), 1..5).prop_flat_map(|entities| {
        let n = entities.len();
        let rel = (
            0..n,
            0..n,
            prop_oneof![
                Just(RelationshipType::ManyToMany),
                Just(RelationshipType::OneToMany),
            ],
        );
        (Just(entities), prop::collection::vec(rel, 0..4)).prop_map(|(entities, rels)| {
            let relationships = rels
                .into_iter()
                .map(|(a, b, kind)| Relationship::new(&entities[a].name, &entities[b].name, kind))
                .collect();
            SchemaDescription {
                entities,
                relationships,
            }
        })
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_one_column_clause_per_attribute(entity in entity_strategy()) {
        let sql = create_table(&entity);
        let clauses: Vec<&str> = sql.lines().filter(|l| l.starts_with("    ")).collect();
        let pk_clauses = clauses.iter().filter(|l| l.trim_start().starts_with("PRIMARY KEY")).count();
        let has_pk = entity.attributes.iter().any(|a| a.is_primary_key);

        prop_assert_eq!(clauses.len() - pk_clauses, entity.attributes.len());
        prop_assert_eq!(pk_clauses, usize::from(has_pk));
    }

    #[test]
    fn prop_not_null_matches_nullability(entity in entity_strategy()) {
        let sql = create_table(&entity);
        let not_null = sql.matches(" NOT NULL").count();
        let expected = entity.attributes.iter().filter(|a| !a.is_nullable).count();
        prop_assert_eq!(not_null, expected);
    }

    #[test]
    fn prop_synthesis_is_deterministic(schema in schema_strategy()) {
        prop_assert_eq!(synthesize(&schema), synthesize(&schema.clone()));
    }

    #[test]
    fn prop_ddl_parses_as_sqlite(schema in schema_strategy()) {
        let sql = synthesize(&schema);
        let statements = Parser::parse_sql(&SQLiteDialect {}, &sql)
            .map_err(|e| TestCaseError::fail(format!("{e}\n{sql}")))?;

        let junctions = schema
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::ManyToMany)
            .count();
        prop_assert_eq!(statements.len(), schema.entities.len() + junctions);
    }
}
