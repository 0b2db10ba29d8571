//! Turning raw model output into a validated [`SchemaDescription`].

use smartdb_schema::SchemaDescription;

use crate::DescribeError;

/// Parse, normalize and validate a model reply.
pub fn parse_schema_reply(text: &str) -> Result<SchemaDescription, DescribeError> {
    let candidate = extract_json_object(text)?;
    let mut schema: SchemaDescription = serde_json::from_str(candidate)
        .map_err(|e| DescribeError::InvalidModelOutput(format!("not a schema description: {e}")))?;
    schema.normalize();
    schema.validate()?;
    if schema.entities.is_empty() {
        return Err(DescribeError::InvalidModelOutput(
            "model returned no entities".to_string(),
        ));
    }
    Ok(schema)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (```json)
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// The first complete `{ .. }` object, balancing braces outside string literals.
pub(crate) fn extract_json_object(text: &str) -> Result<&str, DescribeError> {
    let trimmed = strip_code_fence(text);
    let Some(start) = trimmed.find('{') else {
        return Err(DescribeError::InvalidModelOutput(
            "no JSON object in model reply".to_string(),
        ));
    };

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in trimmed.char_indices().skip_while(|(i, _)| *i < start) {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&trimmed[start..=idx]);
                }
            }
            _ => {}
        }
    }

    Err(DescribeError::InvalidModelOutput(
        "unterminated JSON object in model reply".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartdb_schema::RelationshipType;

    #[test]
    fn test_extracts_from_fenced_reply() {
        let reply = "```json\n{\"entities\": []}\n```";
        assert_eq!(extract_json_object(reply).unwrap(), "{\"entities\": []}");
    }

    #[test]
    fn test_extracts_first_object_from_prose() {
        let reply = "Here you go: {\"a\": {\"b\": \"}\"}} and {\"c\": 1}";
        assert_eq!(
            extract_json_object(reply).unwrap(),
            "{\"a\": {\"b\": \"}\"}}"
        );
    }

    #[test]
    fn test_missing_or_unterminated_object() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("{\"entities\": [").is_err());
    }

    #[test]
    fn test_reply_is_normalized() {
        let reply = r#"{
            "entities": [
                {"name": "Order Items", "attributes": [
                    {"name": "ID", "type": "integer", "is_primary_key": true, "is_nullable": false},
                    {"name": "placed at", "example": "2024-01-02 10:00:00"}
                ]},
                {"name": "orders", "attributes": [{"name": "id", "type": "INTEGER", "is_primary_key": true}]}
            ],
            "relationships": [{"entity1": "Order Items", "entity2": "orders", "type": "many_to_one"}]
        }"#;
        let schema = parse_schema_reply(reply).unwrap();
        let items = schema.entity("order_items").unwrap();
        assert_eq!(items.attributes[0].name, "id");
        assert_eq!(items.attributes[0].data_type, "INTEGER");
        assert_eq!(items.attributes[1].name, "placed_at");
        assert_eq!(items.attributes[1].data_type, "TIMESTAMP");
        assert!(items.attributes[1].is_nullable);
        assert_eq!(schema.relationships[0].entity1, "order_items");
        assert_eq!(schema.relationships[0].kind, RelationshipType::ManyToOne);
    }

    #[test]
    fn test_dangling_relationship_is_rejected() {
        let reply = r#"{"entities": [{"name": "a", "attributes": []}],
                        "relationships": [{"entity1": "a", "entity2": "ghost", "type": "one_to_one"}]}"#;
        assert!(matches!(
            parse_schema_reply(reply),
            Err(DescribeError::Schema(_))
        ));
    }

    #[test]
    fn test_empty_schema_is_rejected() {
        assert!(matches!(
            parse_schema_reply("{\"entities\": []}"),
            Err(DescribeError::InvalidModelOutput(_))
        ));
    }
}
