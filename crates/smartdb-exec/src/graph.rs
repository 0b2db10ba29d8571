//! Node/edge view of an introspected schema, for diagram frontends.

use serde::Serialize;

use crate::introspect::DatabaseSchema;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub primary: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub columns: Vec<GraphColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl SchemaGraph {
    /// One node per table, one edge per foreign-key column pair.
    pub fn from_schema(schema: &DatabaseSchema) -> Self {
        let mut graph = Self::default();

        for table in &schema.tables {
            graph.nodes.push(GraphNode {
                id: table.name.clone(),
                label: table.name.clone(),
                kind: "table",
                columns: table
                    .columns
                    .iter()
                    .map(|c| GraphColumn {
                        name: c.name.clone(),
                        data_type: c.data_type.clone(),
                        primary: c.is_primary_key,
                        nullable: !c.not_null,
                    })
                    .collect(),
            });

            for fk in &table.foreign_keys {
                graph.edges.push(GraphEdge {
                    id: format!("{}_to_{}", table.name, fk.referenced_table),
                    source: table.name.clone(),
                    target: fk.referenced_table.clone(),
                    label: format!(
                        "{} → {}",
                        fk.from_column,
                        fk.to_column.as_deref().unwrap_or("")
                    ),
                    kind: "foreign_key",
                });
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqlExecutor;

    #[test]
    fn test_graph_from_live_schema() {
        let mut exec = SqlExecutor::default();
        let result = exec.execute(
            "CREATE TABLE category (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
             CREATE TABLE product (\n\
               id INTEGER PRIMARY KEY,\n\
               category_id INTEGER,\n\
               FOREIGN KEY (category_id) REFERENCES category (id)\n\
             );",
        );
        assert!(result.success, "{}", result.message);

        let graph = SchemaGraph::from_schema(&exec.get_schema().unwrap());
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let edge = &graph.edges[0];
        assert_eq!(edge.id, "product_to_category");
        assert_eq!(edge.label, "category_id → id");
        assert_eq!(edge.kind, "foreign_key");

        let category = graph.nodes.iter().find(|n| n.id == "category").unwrap();
        assert!(category.columns[0].primary);
        assert!(!category.columns[1].nullable);
    }
}
