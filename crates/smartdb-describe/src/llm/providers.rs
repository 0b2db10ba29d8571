//! LLM API Providers
//!
//! Concrete implementations for OpenAI, Anthropic, and local
//! OpenAI-compatible servers (Ollama, vLLM, ...).

use super::*;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const LOCAL_LLM_URL_ENV: &str = "LOCAL_LLM_URL";
pub const LOCAL_LLM_MODEL_ENV: &str = "LOCAL_LLM_MODEL";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_LOCAL_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MAX_TOKENS: usize = 4096;

// ============================================================================
// Configuration
// ============================================================================

/// LLM configuration, built explicitly and handed to the describer.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    /// Fixed placeholder schemas, no network.
    #[default]
    Placeholder,
    OpenAI,
    Anthropic,
    Local,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" | "mock" => Ok(Self::Placeholder),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(ConfigError::Invalid(format!(
                "unknown llm provider `{other}` (expected placeholder|openai|anthropic|local)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Local => "local",
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::placeholder()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LlmConfig {
    pub fn placeholder() -> Self {
        Self {
            provider: Provider::Placeholder,
            api_key: String::new(),
            model: "placeholder".to_string(),
            base_url: None,
            timeout_secs: 60,
            max_retries: 0,
        }
    }

    /// Create OpenAI config
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::OpenAI,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
            max_retries: 3,
        }
    }

    /// Create Anthropic config
    pub fn anthropic(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
            max_retries: 3,
        }
    }

    /// Create local config
    pub fn local(url: &str, model: &str) -> Self {
        Self {
            provider: Provider::Local,
            api_key: String::new(),
            model: model.to_string(),
            base_url: Some(url.to_string()),
            timeout_secs: 120,
            max_retries: 1,
        }
    }

    /// Build the config for `provider`, reading secrets and defaults from env.
    ///
    /// `model` and `base_url` override the corresponding env vars.
    pub fn from_env(
        provider: Provider,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match provider {
            Provider::Placeholder => Self::placeholder(),
            Provider::OpenAI => {
                let key = env_non_empty(OPENAI_API_KEY_ENV)
                    .ok_or(ConfigError::MissingApiKey(OPENAI_API_KEY_ENV))?;
                let model = env_non_empty(OPENAI_MODEL_ENV)
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                let mut config = Self::openai(&key, &model);
                config.base_url = env_non_empty(OPENAI_BASE_URL_ENV);
                config
            }
            Provider::Anthropic => {
                let key = env_non_empty(ANTHROPIC_API_KEY_ENV)
                    .ok_or(ConfigError::MissingApiKey(ANTHROPIC_API_KEY_ENV))?;
                let model = env_non_empty(ANTHROPIC_MODEL_ENV)
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string());
                let mut config = Self::anthropic(&key, &model);
                config.base_url = env_non_empty(ANTHROPIC_BASE_URL_ENV);
                config
            }
            Provider::Local => {
                let url = env_non_empty(LOCAL_LLM_URL_ENV)
                    .unwrap_or_else(|| DEFAULT_LOCAL_BASE_URL.to_string());
                let model =
                    env_non_empty(LOCAL_LLM_MODEL_ENV).unwrap_or_else(|| "default".to_string());
                Self::local(&url, &model)
            }
        };

        if provider != Provider::Placeholder {
            if let Some(model) = model {
                config.model = model;
            }
            if base_url.is_some() {
                config.base_url = base_url;
            }
        }
        Ok(config)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LLM provider requires {0} to be set")]
    MissingApiKey(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Build the HTTP client for `config`; `None` for the placeholder provider.
pub fn build_provider(config: &LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>, ConfigError> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        Provider::Placeholder => return Ok(None),
        Provider::OpenAI => Arc::new(OpenAiProvider::new(config.clone())?),
        Provider::Anthropic => Arc::new(AnthropicProvider::new(config.clone())?),
        Provider::Local => Arc::new(LocalProvider::new(config.clone())?),
    };
    Ok(Some(provider))
}

fn http_client(config: &LlmConfig) -> Result<Client, ConfigError> {
    let mut builder = Client::builder();
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build http client: {e}")))
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// ============================================================================
// OpenAI wire format (shared with local servers)
// ============================================================================

fn openai_content(message: &Message) -> serde_json::Value {
    if !message.has_image() {
        return json!(message.text());
    }
    let parts: Vec<serde_json::Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "type": "text", "text": text }),
            ContentPart::Image {
                media_type,
                base64_data,
            } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{media_type};base64,{base64_data}") }
            }),
        })
        .collect();
    json!(parts)
}

fn openai_chat_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": openai_content(m) }))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

fn openai_parse_response(data: &serde_json::Value, model: &str) -> Result<CompletionResponse, LlmError> {
    let content = data["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))?
        .to_string();

    let finish_reason = match data["choices"][0]["finish_reason"].as_str() {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    Ok(CompletionResponse {
        content,
        finish_reason,
        usage: Usage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
        },
        model: model.to_string(),
    })
}

async fn send_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, LlmError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;

    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        return Err(LlmError::RateLimited {
            retry_after_ms: retry_after.saturating_mul(1000),
        });
    }

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(LlmError::Api(format!("http {status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

// ============================================================================
// OpenAI Provider
// ============================================================================

pub struct OpenAiProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL);
        format!("{}/chat/completions", trim_base_url(base))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = openai_chat_body(&self.config.model, request);
        let data = send_json(
            self.client.post(self.url()).bearer_auth(&self.config.api_key),
            &body,
        )
        .await?;
        openai_parse_response(&data, &self.config.model)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "openai",
            name: self.config.model.clone(),
        }
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

pub struct AnthropicProvider {
    client: Client,
    config: LlmConfig,
}

impl AnthropicProvider {
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL);
        format!("{}/v1/messages", trim_base_url(base))
    }
}

fn anthropic_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let system: Vec<String> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .collect();

    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let content: Vec<serde_json::Value> = m
                .content
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                    ContentPart::Image {
                        media_type,
                        base64_data,
                    } => json!({
                        "type": "image",
                        "source": { "type": "base64", "media_type": media_type, "data": base64_data }
                    }),
                })
                .collect();
            json!({ "role": m.role.as_str(), "content": content })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }
    body
}

fn anthropic_extract_text(data: &serde_json::Value) -> Option<String> {
    let blocks = data.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();
    let joined = text.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = anthropic_body(&self.config.model, request);
        let data = send_json(
            self.client
                .post(self.url())
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            &body,
        )
        .await?;

        let content = anthropic_extract_text(&data).ok_or_else(|| {
            LlmError::InvalidResponse("no text blocks in response".to_string())
        })?;
        let finish_reason = match data["stop_reason"].as_str() {
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage: Usage {
                prompt_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                completion_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: self.config.model.clone(),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "anthropic",
            name: self.config.model.clone(),
        }
    }
}

// ============================================================================
// Local Provider (Ollama, vLLM, etc.)
// ============================================================================

pub struct LocalProvider {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl LocalProvider {
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            ConfigError::Invalid("local provider requires a base URL".to_string())
        })?;
        let client = http_client(&config)?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", trim_base_url(&self.base_url))
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = openai_chat_body(&self.config.model, request);
        let data = send_json(self.client.post(self.url()), &body).await?;
        openai_parse_response(&data, &self.config.model)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "local",
            name: self.config.model.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
