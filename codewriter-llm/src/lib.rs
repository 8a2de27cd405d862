//! # codewriter-llm
//!
//! Trait-based access to chat-completion models.
//!
//! - **Messages**: system / user / assistant / tool turns, including tool calls
//! - **Providers**: OpenAI-compatible endpoints (OpenAI, Gemini, Ollama) and Anthropic
//! - **Streaming**: server-sent events decoded into [`StreamChunk`]s
//! - **Usage**: per-call token counts aggregated by [`UsageTracker`]

pub mod provider;

pub use codewriter_error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, FinishReason,
    LlmProvider, OpenAIProvider, Provider, ProviderConfig, ProviderType, Role,
    ScriptedProvider, StreamChunk, StreamReceiver, ToolCall, ToolChoice, ToolDefinition, Usage,
    UsageTracker,
};
