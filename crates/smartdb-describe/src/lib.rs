//! SmartDB Describe: natural language and ER diagrams to schema descriptions.
//!
//! ```text
//! text ─────────────► prompt ─┐
//!                             ├─► LlmProvider ─► parse ─► normalize ─► validate
//! image ─► decode/PNG ► prompt┘
//! ```
//!
//! Without a configured provider the describer returns fixed placeholder
//! schemas, which keeps the HTTP surface usable offline.

pub mod describer;
pub mod diagram;
pub mod llm;
pub mod parse;
pub mod prompt;

pub use describer::{placeholder_image_schema, placeholder_text_schema, Backend, SchemaDescriber};
pub use diagram::{DiagramImage, ImageError};
pub use llm::{ConfigError, LlmConfig, LlmError, LlmProvider, Provider};
pub use parse::parse_schema_reply;

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("Description text is empty")]
    EmptyInput,
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("LLM configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Model returned an unusable schema: {0}")]
    InvalidModelOutput(String),
    #[error("Model returned an invalid schema: {0}")]
    Schema(#[from] smartdb_schema::SchemaError),
}
