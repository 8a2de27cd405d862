//! # LLM Provider Interface
//!
//! `LlmProvider` is the single seam between codewriter and a model backend.
//!
//! - `OpenAIProvider` speaks the `/chat/completions` dialect (OpenAI, Gemini's
//!   OpenAI endpoint, Ollama, vLLM)
//! - `AnthropicProvider` speaks the `/messages` dialect
//! - `Provider` picks one of the two at runtime from a `ProviderConfig`
//! - `ScriptedProvider` replays canned responses for tests

pub mod anthropic;
pub mod openai;
pub mod scripted;
mod sse;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;
pub use scripted::ScriptedProvider;

use codewriter_error::{Error, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant turn that requested tool calls. The text part is optional.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool the model may call. `parameters` is a JSON schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as sent by the model
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }

    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.arguments).map_err(|e| {
            Error::parse_failed(format!("invalid arguments for tool '{}': {}", self.name, e))
                .with_context("tool", self.name.clone())
                .set_source(e)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function { name: String },
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Like `with_model`, but leaves the provider default in place for `None`
    pub fn with_model_opt(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model {
            self.model = Some(model.to_string());
        }
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl CompletionResponse {
    /// The text content, or an `EmptyResponse` error when the model sent none
    pub fn into_text(self) -> Result<String> {
        match self.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(Error::empty_response(self.model)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A streaming chunk from the model
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// The transport or the provider reported an error mid-stream
    Error(String),
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic")
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Send a completion request and stream the text back
    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver>;
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.inner.next().await
    }

    /// Drain the stream, handing each text delta to `on_text` as it arrives.
    ///
    /// Returns the full text and the usage reported by the final chunk, if any.
    pub async fn collect_text_with<F>(mut self, mut on_text: F) -> Result<(String, Option<Usage>)>
    where
        F: FnMut(&str),
    {
        let mut text = String::new();
        let mut usage = None;

        while let Some(chunk) = self.next().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    on_text(&delta);
                    text.push_str(&delta);
                }
                StreamChunk::Done { usage: reported, .. } => {
                    if reported.is_some() {
                        usage = reported;
                    }
                }
                StreamChunk::Error(e) => {
                    return Err(Error::inference_failed(e).with_operation("stream::collect"));
                }
            }
        }
        Ok((text, usage))
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Gemini,
    Anthropic,
    /// Ollama or any other keyless OpenAI-compatible server
    Local,
}

impl ProviderType {
    /// Environment variables consulted for the API key, in order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderType::OpenAI => &["OPENAI_API_KEY"],
            ProviderType::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            ProviderType::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderType::Local => &[],
        }
    }
}

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

impl ProviderConfig {
    fn base(provider_type: ProviderType, api_key: Option<String>, base_url: &str, model: &str) -> Self {
        Self {
            provider_type,
            api_key,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::base(ProviderType::OpenAI, Some(api_key.into()), "https://api.openai.com/v1", "gpt-4o")
    }

    /// Gemini through its OpenAI-compatible endpoint
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::base(ProviderType::Gemini, Some(api_key.into()), GEMINI_BASE_URL, "gemini-2.5-flash")
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut config = Self::base(
            ProviderType::Anthropic,
            Some(api_key.into()),
            "https://api.anthropic.com/v1",
            "claude-sonnet-4-20250514",
        );
        config.headers.insert("anthropic-version".into(), "2023-06-01".into());
        config
    }

    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let mut config = Self::base(ProviderType::Local, None, "", "");
        config.base_url = Some(base_url.into());
        config.default_model = Some(model.into());
        config.timeout_secs = Some(300);
        config
    }

    /// Build a config for `provider_type`, reading the API key from the
    /// environment variables listed by [`ProviderType::api_key_vars`].
    pub fn from_env(provider_type: ProviderType) -> Result<Self> {
        let vars = provider_type.api_key_vars();
        let key = vars
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()));

        match (provider_type, key) {
            (ProviderType::Local, _) => Ok(Self::local(OLLAMA_BASE_URL, "llama3.3")),
            (ProviderType::OpenAI, Some(key)) => Ok(Self::openai(key)),
            (ProviderType::Gemini, Some(key)) => Ok(Self::gemini(key)),
            (ProviderType::Anthropic, Some(key)) => Ok(Self::anthropic(key)),
            (_, None) => Err(Error::config_invalid(format!(
                "no API key found, set one of: {}",
                vars.join(", ")
            ))
            .with_operation("provider_config::from_env")),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| {
                Error::config_invalid("failed to build HTTP client")
                    .with_operation("provider::http_client")
                    .set_source(e)
            })
    }
}

/// Map a non-success HTTP response to an error, consuming the body
pub(crate) async fn error_for_response(response: reqwest::Response, operation: &'static str) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::from_http_status(status, body).with_operation(operation)
}

pub(crate) fn network_error(err: reqwest::Error, operation: &'static str) -> Error {
    Error::network_failed(err.to_string())
        .with_operation(operation)
        .set_source(err)
}

// ============================================================================
// Runtime-selected provider
// ============================================================================

/// One of the concrete providers, chosen from a [`ProviderConfig`]
pub enum Provider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl Provider {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        match config.provider_type {
            ProviderType::Anthropic => Ok(Provider::Anthropic(AnthropicProvider::new(config)?)),
            ProviderType::OpenAI | ProviderType::Gemini | ProviderType::Local => {
                Ok(Provider::OpenAI(OpenAIProvider::new(config)?))
            }
        }
    }
}

impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.name(),
            Provider::Anthropic(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.default_model(),
            Provider::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match self {
            Provider::OpenAI(p) => p.complete(request).await,
            Provider::Anthropic(p) => p.complete(request).await,
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        match self {
            Provider::OpenAI(p) => p.stream(request).await,
            Provider::Anthropic(p) => p.stream(request).await,
        }
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        self.by_model.entry(model.to_string()).or_default().add(usage);
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

// ============================================================================
// Tests
// ============================================================================
