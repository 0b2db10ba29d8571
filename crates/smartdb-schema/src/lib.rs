//! Schema descriptions for SmartDB
//!
//! The structured `{entities, relationships}` format shared by every stage of
//! the pipeline:
//! - the describer produces it (from text or an ER diagram),
//! - the DDL synthesizer consumes it,
//! - model output is validated against it before it leaves the describer.
//!
//! The JSON shape is the wire contract with AI backends, so field names are
//! kept in `snake_case` and optional flags carry explicit defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod naming;

pub use naming::{infer_sql_type, sanitize_column_name, sanitize_table_name};

// ============================================================================
// Core Types
// ============================================================================

/// A single column of an entity (or of a relationship).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// SQL type name, emitted verbatim.
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    /// Sample value supplied by a model; only used to infer a missing type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

fn default_nullable() -> bool {
    true
}

impl Attribute {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_primary_key: false,
            is_nullable: true,
            example: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// An entity; its name becomes the table name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Entity {
    pub fn new(name: &str, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.to_string(),
            attributes,
        }
    }

    /// Primary-key column names, in attribute order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.is_primary_key)
            .map(|a| a.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub entity1: String,
    pub entity2: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    /// Relationship-owned attributes. Not emitted by the synthesizer.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Relationship {
    pub fn new(entity1: &str, entity2: &str, kind: RelationshipType) -> Self {
        Self {
            entity1: entity1.to_string(),
            entity2: entity2.to_string(),
            kind,
            attributes: Vec::new(),
        }
    }
}

/// `{entities, relationships}`: built once per request, consumed once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity #{index} has an empty name")]
    EmptyEntityName { index: usize },
    #[error("duplicate entity `{0}`")]
    DuplicateEntity(String),
    #[error("entity `{entity}` has an attribute with an empty name")]
    EmptyAttributeName { entity: String },
    #[error("duplicate attribute `{attribute}` in entity `{entity}`")]
    DuplicateAttribute { entity: String, attribute: String },
    #[error("relationship #{index} references unknown entity `{entity}`")]
    UnknownEntity { index: usize, entity: String },
}

impl SchemaDescription {
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check the description invariants.
    ///
    /// Validation is separate from synthesis: the synthesizer happily renders
    /// dangling references, callers decide whether to reject them first.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for (index, entity) in self.entities.iter().enumerate() {
            if entity.name.trim().is_empty() {
                return Err(SchemaError::EmptyEntityName { index });
            }
            if !names.insert(entity.name.as_str()) {
                return Err(SchemaError::DuplicateEntity(entity.name.clone()));
            }

            let mut attrs = HashSet::new();
            for attr in &entity.attributes {
                if attr.name.trim().is_empty() {
                    return Err(SchemaError::EmptyAttributeName {
                        entity: entity.name.clone(),
                    });
                }
                if !attrs.insert(attr.name.as_str()) {
                    return Err(SchemaError::DuplicateAttribute {
                        entity: entity.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
            }
        }

        for (index, rel) in self.relationships.iter().enumerate() {
            for entity in [&rel.entity1, &rel.entity2] {
                if !names.contains(entity.as_str()) {
                    return Err(SchemaError::UnknownEntity {
                        index,
                        entity: entity.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Rewrite identifiers into SQL-safe form and fill in missing types.
    ///
    /// Relationship endpoints go through the same table-name sanitizer as
    /// entity names so references keep resolving after normalization.
    pub fn normalize(&mut self) {
        for entity in &mut self.entities {
            entity.name = sanitize_table_name(&entity.name);
            normalize_attributes(&mut entity.attributes);
        }
        for rel in &mut self.relationships {
            rel.entity1 = sanitize_table_name(&rel.entity1);
            rel.entity2 = sanitize_table_name(&rel.entity2);
            normalize_attributes(&mut rel.attributes);
        }
    }
}

fn normalize_attributes(attributes: &mut [Attribute]) {
    for attr in attributes {
        attr.name = sanitize_column_name(&attr.name);
        let data_type = attr.data_type.trim();
        attr.data_type = if data_type.is_empty() {
            match &attr.example {
                Some(sample) => infer_sql_type(sample).to_string(),
                None => "TEXT".to_string(),
            }
        } else {
            data_type.to_ascii_uppercase()
        };
    }
}
