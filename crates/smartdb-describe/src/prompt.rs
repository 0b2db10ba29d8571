//! Prompts sent to the model for both input kinds.

use crate::llm::{CompletionRequest, Message};

const SCHEMA_FORMAT: &str = r#"Respond with a single JSON object and nothing else, in this format:
{
  "entities": [
    {
      "name": "table_name",
      "attributes": [
        {"name": "id", "type": "INTEGER", "is_primary_key": true, "is_nullable": false},
        {"name": "column_name", "type": "TEXT", "is_primary_key": false, "is_nullable": true, "example": "sample value"}
      ]
    }
  ],
  "relationships": [
    {"entity1": "child_table", "entity2": "parent_table", "type": "many_to_one", "attributes": []}
  ]
}

Rules:
- Use SQLite column types: INTEGER, REAL, TEXT, BLOB, BOOLEAN, DATE, TIMESTAMP.
- Use lowercase snake_case identifiers.
- Every entity has a primary key attribute, usually "id".
- Relationship "type" is one of one_to_one, one_to_many, many_to_one, many_to_many.
- Relationships only reference entities listed in "entities".
- "example" is optional; include it when the input shows sample values."#;

const SYSTEM_PROMPT: &str =
    "You are a database architect. You turn descriptions of data into relational schemas.";

const MAX_TOKENS: usize = 4096;

pub fn text_request(description: &str) -> CompletionRequest {
    let prompt = format!(
        "Design a relational database schema for the following description.\n\n\
         Description:\n{description}\n\n{SCHEMA_FORMAT}"
    );
    request(Message::user(prompt))
}

pub fn image_request(png_base64: String) -> CompletionRequest {
    let prompt = format!(
        "The attached image is an entity-relationship diagram. Extract every entity, \
         its attributes, and the relationships between entities.\n\n{SCHEMA_FORMAT}"
    );
    request(Message::user(prompt).with_image("image/png", png_base64))
}

fn request(user: Message) -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system(SYSTEM_PROMPT), user],
        max_tokens: Some(MAX_TOKENS),
        temperature: Some(0.0),
        json_mode: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_prompt_embeds_description() {
        let req = text_request("a library with books and members");
        assert_eq!(req.messages.len(), 2);
        let text = req.messages[1].text();
        assert!(text.contains("a library with books and members"));
        assert!(text.contains("many_to_many"));
        assert!(!req.messages[1].has_image());
    }

    #[test]
    fn test_image_prompt_attaches_png() {
        let req = image_request("iVBOR".to_string());
        assert!(req.messages[1].has_image());
        assert!(req.json_mode);
    }
}
