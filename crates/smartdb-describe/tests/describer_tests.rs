//! Describer behaviour against scripted providers.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use smartdb_describe::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, ModelInfo, Usage,
};
use smartdb_describe::{DescribeError, SchemaDescriber};
use smartdb_schema::RelationshipType;

/// Replays canned replies and records every request.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    seen: Mutex<Vec<CompletionRequest>>,
    finish_reason: FinishReason,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Self::finishing_with(replies, FinishReason::Stop)
    }

    fn finishing_with(
        replies: Vec<Result<String, LlmError>>,
        finish_reason: FinishReason,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            finish_reason,
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.seen.lock().unwrap().push(request.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())));
        next.map(|content| CompletionResponse {
            content,
            finish_reason: self.finish_reason,
            usage: Usage::default(),
            model: "scripted".to_string(),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted",
            name: "scripted".to_string(),
        }
    }
}

const LIBRARY_REPLY: &str = r#"Sure! Here is the schema:
```json
{
  "entities": [
    {"name": "Book", "attributes": [
      {"name": "id", "type": "INTEGER", "is_primary_key": true, "is_nullable": false},
      {"name": "title", "type": "TEXT", "is_nullable": false},
      {"name": "published", "example": "1999-04-01"}
    ]},
    {"name": "Member", "attributes": [
      {"name": "id", "type": "INTEGER", "is_primary_key": true, "is_nullable": false}
    ]}
  ],
  "relationships": [
    {"entity1": "Book", "entity2": "Member", "type": "many_to_many"}
  ]
}
```"#;

fn describer(provider: Arc<ScriptedProvider>, retries: u32) -> SchemaDescriber {
    SchemaDescriber::with_provider(provider)
        .with_max_retries(retries)
        .with_retry_backoff(Duration::ZERO)
}

fn tiny_png() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])))
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn test_text_reply_is_parsed_and_normalized() {
    let provider = ScriptedProvider::new(vec![Ok(LIBRARY_REPLY.to_string())]);
    let schema = describer(provider.clone(), 0)
        .describe_text("books borrowed by members")
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    let book = schema.entity("book").unwrap();
    assert_eq!(book.attributes[2].data_type, "DATE");
    assert_eq!(schema.relationships[0].kind, RelationshipType::ManyToMany);
    assert_eq!(schema.relationships[0].entity2, "member");

    let seen = provider.seen.lock().unwrap();
    assert!(seen[0].messages[1].text().contains("books borrowed by members"));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let provider = ScriptedProvider::new(vec![
        Err(LlmError::RateLimited { retry_after_ms: 0 }),
        Err(LlmError::Network("connection reset".to_string())),
        Ok(LIBRARY_REPLY.to_string()),
    ]);
    let schema = describer(provider.clone(), 2)
        .describe_text("library")
        .await
        .unwrap();
    assert_eq!(provider.calls(), 3);
    assert_eq!(schema.entities.len(), 2);
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let provider = ScriptedProvider::new(vec![
        Err(LlmError::RateLimited { retry_after_ms: 50 }),
        Ok(LIBRARY_REPLY.to_string()),
    ]);
    let started = std::time::Instant::now();
    describer(provider.clone(), 1)
        .describe_text("library")
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_truncated_reply_is_reported() {
    let provider = ScriptedProvider::finishing_with(
        vec![Ok(r#"{"entities": [{"name": "book", "attri"#.to_string())],
        FinishReason::Length,
    );
    let err = describer(provider.clone(), 3)
        .describe_text("library")
        .await
        .unwrap_err();
    match err {
        DescribeError::Llm(LlmError::InvalidResponse(msg)) => {
            assert!(msg.contains("cut off at the token limit"), "{msg}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let provider = ScriptedProvider::new(vec![
        Err(LlmError::Network("down".to_string())),
        Err(LlmError::Network("down".to_string())),
        Ok(LIBRARY_REPLY.to_string()),
    ]);
    let err = describer(provider.clone(), 1)
        .describe_text("library")
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::Llm(LlmError::Network(_))));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_api_errors_are_not_retried() {
    let provider = ScriptedProvider::new(vec![
        Err(LlmError::Api("http 401".to_string())),
        Ok(LIBRARY_REPLY.to_string()),
    ]);
    let err = describer(provider.clone(), 3)
        .describe_text("library")
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::Llm(LlmError::Api(_))));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_garbage_reply_is_rejected() {
    let provider = ScriptedProvider::new(vec![Ok("I cannot help with that.".to_string())]);
    let err = describer(provider, 0)
        .describe_text("library")
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::InvalidModelOutput(_)));
}

#[tokio::test]
async fn test_image_is_sent_as_png() {
    let provider = ScriptedProvider::new(vec![Ok(LIBRARY_REPLY.to_string())]);
    let schema = describer(provider.clone(), 0)
        .describe_image(&tiny_png())
        .await
        .unwrap();
    assert_eq!(schema.entities.len(), 2);

    let seen = provider.seen.lock().unwrap();
    assert!(seen[0].messages[1].has_image());
}

#[tokio::test]
async fn test_non_image_upload_never_reaches_provider() {
    let provider = ScriptedProvider::new(vec![Ok(LIBRARY_REPLY.to_string())]);
    let err = describer(provider.clone(), 0)
        .describe_image(b"%PDF-1.4")
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::Image(_)));
    assert_eq!(provider.calls(), 0);
}
