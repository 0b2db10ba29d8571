//! Schema describer: text or ER-diagram image in, `SchemaDescription` out.

use std::sync::Arc;
use std::time::Duration;

use smartdb_schema::{Attribute, Entity, Relationship, RelationshipType, SchemaDescription};

use crate::diagram::DiagramImage;
use crate::llm::{
    build_provider, CompletionRequest, FinishReason, LlmConfig, LlmError, LlmProvider,
};

/// Upper bound on a server-requested `retry-after` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);
use crate::{parse, prompt, DescribeError};

/// Where descriptions come from.
#[derive(Clone)]
pub enum Backend {
    /// Fixed schemas, no network.
    Placeholder,
    Llm(Arc<dyn LlmProvider>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placeholder => f.write_str("Placeholder"),
            Self::Llm(p) => {
                let info = p.model_info();
                write!(f, "Llm({}/{})", info.provider, info.name)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaDescriber {
    backend: Backend,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Default for SchemaDescriber {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl SchemaDescriber {
    pub fn placeholder() -> Self {
        Self {
            backend: Backend::Placeholder,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            backend: Backend::Llm(provider),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Build the describer selected by `config`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, DescribeError> {
        let describer = match build_provider(config)? {
            None => Self::placeholder(),
            Some(provider) => Self::with_provider(provider).with_max_retries(config.max_retries),
        };
        Ok(describer)
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub async fn describe_text(&self, description: &str) -> Result<SchemaDescription, DescribeError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(DescribeError::EmptyInput);
        }

        match &self.backend {
            Backend::Placeholder => Ok(placeholder_text_schema()),
            Backend::Llm(provider) => {
                let reply = self
                    .complete_with_retry(provider.as_ref(), &prompt::text_request(description))
                    .await?;
                parse::parse_schema_reply(&reply)
            }
        }
    }

    /// The upload is always decoded, so non-images fail on every backend.
    pub async fn describe_image(&self, bytes: &[u8]) -> Result<SchemaDescription, DescribeError> {
        let image = DiagramImage::decode(bytes)?;
        let (width, height) = image.dimensions();
        tracing::debug!(width, height, "decoded ER diagram");

        match &self.backend {
            Backend::Placeholder => Ok(placeholder_image_schema()),
            Backend::Llm(provider) => {
                let request = prompt::image_request(image.to_base64_png()?);
                let reply = self.complete_with_retry(provider.as_ref(), &request).await?;
                parse::parse_schema_reply(&reply)
            }
        }
    }

    /// `retry-after` from a rate limit (capped), otherwise `attempt * backoff`.
    fn retry_delay(&self, err: &LlmError, attempt: u32) -> Duration {
        match err {
            LlmError::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                Duration::from_millis(*retry_after_ms).min(MAX_RETRY_AFTER)
            }
            _ => self.retry_backoff * attempt,
        }
    }

    async fn complete_with_retry(
        &self,
        provider: &dyn LlmProvider,
        request: &CompletionRequest,
    ) -> Result<String, LlmError> {
        let info = provider.model_info();
        let mut attempt: u32 = 0;
        loop {
            match provider.complete(request).await {
                Ok(response) if response.finish_reason == FinishReason::Length => {
                    tracing::error!(
                        provider = info.provider,
                        model = %response.model,
                        completion_tokens = response.usage.completion_tokens,
                        "model reply truncated"
                    );
                    return Err(LlmError::InvalidResponse(format!(
                        "reply from {} was cut off at the token limit",
                        response.model
                    )));
                }
                Ok(response) => {
                    tracing::info!(
                        provider = info.provider,
                        model = %response.model,
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        "model reply received"
                    );
                    return Ok(response.content);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(&err, attempt);
                    tracing::warn!(
                        provider = info.provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient LLM failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(provider = info.provider, error = %err, "LLM request failed");
                    return Err(err);
                }
            }
        }
    }
}

/// `users(id, username)`.
pub fn placeholder_text_schema() -> SchemaDescription {
    SchemaDescription {
        entities: vec![Entity::new(
            "users",
            vec![
                Attribute::new("id", "INTEGER").primary_key().not_null(),
                Attribute::new("username", "TEXT").not_null(),
            ],
        )],
        relationships: Vec::new(),
    }
}

/// `product` and `category` with product → category many-to-one.
pub fn placeholder_image_schema() -> SchemaDescription {
    SchemaDescription {
        entities: vec![
            Entity::new(
                "product",
                vec![
                    Attribute::new("id", "INTEGER").primary_key().not_null(),
                    Attribute::new("name", "TEXT").not_null(),
                    Attribute::new("price", "REAL"),
                ],
            ),
            Entity::new(
                "category",
                vec![
                    Attribute::new("id", "INTEGER").primary_key().not_null(),
                    Attribute::new("name", "TEXT").not_null(),
                ],
            ),
        ],
        relationships: vec![Relationship::new(
            "product",
            "category",
            RelationshipType::ManyToOne,
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_valid() {
        placeholder_text_schema().validate().unwrap();
        placeholder_image_schema().validate().unwrap();
    }

    #[tokio::test]
    async fn test_placeholder_rejects_blank_text() {
        let describer = SchemaDescriber::placeholder();
        assert!(matches!(
            describer.describe_text("   ").await,
            Err(DescribeError::EmptyInput)
        ));
        let schema = describer.describe_text("a blog").await.unwrap();
        assert_eq!(schema.entities[0].name, "users");
    }

    #[tokio::test]
    async fn test_placeholder_still_decodes_image() {
        let describer = SchemaDescriber::placeholder();
        assert!(matches!(
            describer.describe_image(b"not an image").await,
            Err(DescribeError::Image(_))
        ));
    }

    #[test]
    fn test_retry_delay_prefers_capped_retry_after() {
        let describer =
            SchemaDescriber::placeholder().with_retry_backoff(Duration::from_millis(100));

        let limited = LlmError::RateLimited { retry_after_ms: 2_000 };
        assert_eq!(describer.retry_delay(&limited, 1), Duration::from_secs(2));

        let huge = LlmError::RateLimited { retry_after_ms: 3_600_000 };
        assert_eq!(describer.retry_delay(&huge, 1), MAX_RETRY_AFTER);

        let unknown = LlmError::RateLimited { retry_after_ms: 0 };
        assert_eq!(describer.retry_delay(&unknown, 3), Duration::from_millis(300));

        let network = LlmError::Network("reset".to_string());
        assert_eq!(describer.retry_delay(&network, 2), Duration::from_millis(200));
    }

    #[test]
    fn test_from_placeholder_config() {
        let describer = SchemaDescriber::from_config(&LlmConfig::placeholder()).unwrap();
        assert!(matches!(describer.backend(), Backend::Placeholder));
    }
}
