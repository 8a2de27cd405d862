//! Anthropic Claude provider implementation

use super::sse::SseBuffer;
use super::*;
use codewriter_error::ErrorKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1")
            .trim_end_matches('/')
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> AnthropicRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());
        let (system, messages) = to_anthropic_messages(request.messages);

        AnthropicRequest {
            model,
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream: Some(stream),
            tools: request.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|t| AnthropicTool {
                        name: t.name,
                        description: t.description,
                        input_schema: t.parameters,
                    })
                    .collect()
            }),
            tool_choice: request.tool_choice.and_then(|tc| match tc {
                ToolChoice::Auto => Some(serde_json::json!({"type": "auto"})),
                ToolChoice::Required => Some(serde_json::json!({"type": "any"})),
                ToolChoice::Function { name } => {
                    Some(serde_json::json!({"type": "tool", "name": name}))
                }
                ToolChoice::None => None,
            }),
            stop_sequences: request.stop,
        }
    }

    async fn send(&self, body: &AnthropicRequest, operation: &'static str) -> Result<reqwest::Response> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::AuthenticationFailed, "missing Anthropic API key")
                .with_operation(operation)
        })?;

        debug!(model = %body.model, messages = body.messages.len(), "anthropic request");

        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .json(body);

        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", "2023-06-01");
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await.map_err(|e| network_error(e, operation))?;
        if !response.status().is_success() {
            return Err(error_for_response(response, operation)
                .await
                .with_context("model", body.model.clone()));
        }
        Ok(response)
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(request, false);
        let response = self.send(&body, "anthropic::complete").await?;

        let api_response: AnthropicResponse = response.json().await.map_err(|e| {
            Error::parse_failed("undecodable messages response")
                .with_operation("anthropic::complete")
                .set_source(e)
        })?;

        Ok(into_completion(api_response))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let body = self.build_request(request, true);
        let response = self.send(&body, "anthropic::stream").await?;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut sse = SseBuffer::default();
            let mut decoder = StreamDecoder::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                };
                for event in sse.push(&chunk) {
                    let name = event.event.as_deref().unwrap_or("");
                    if let Some(item) = decoder.decode(name, &event.data) {
                        let finished = matches!(item, StreamChunk::Error(_));
                        yield item;
                        if finished {
                            return;
                        }
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Split out the system prompt and convert the remaining turns.
///
/// Consecutive tool results are merged into one user turn, since the API
/// expects every `tool_use` block to be answered in the following message.
fn to_anthropic_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system: Option<String> = None;
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.content.unwrap_or_default();
                system = Some(match system {
                    Some(prev) => format!("{}\n\n{}", prev, text),
                    None => text,
                });
            }
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.unwrap_or_default(),
                    content: msg.content.unwrap_or_default(),
                };
                match out.last_mut() {
                    Some(AnthropicMessage { role, content: AnthropicContent::Blocks(blocks) })
                        if role.as_str() == "user"
                            && blocks
                                .iter()
                                .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        blocks.push(block);
                    }
                    _ => out.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
            Role::Assistant if msg.tool_calls.as_ref().is_some_and(|c| !c.is_empty()) => {
                let mut blocks = Vec::new();
                if let Some(text) = msg.content.filter(|t| !t.is_empty()) {
                    blocks.push(AnthropicContentBlock::Text { text });
                }
                for call in msg.tool_calls.unwrap_or_default() {
                    let input = serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| serde_json::json!({}));
                    blocks.push(AnthropicContentBlock::ToolUse {
                        id: call.id,
                        name: call.name,
                        input,
                    });
                }
                out.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(blocks),
                });
            }
            Role::User | Role::Assistant => out.push(AnthropicMessage {
                role: msg.role.as_str().into(),
                content: AnthropicContent::Text(msg.content.unwrap_or_default()),
            }),
        }
    }

    (system, out)
}

fn stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    }
}

fn into_completion(api_response: AnthropicResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in api_response.content {
        match block {
            AnthropicContentBlock::Text { text } => content.push_str(&text),
            AnthropicContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input.to_string(),
            }),
            AnthropicContentBlock::ToolResult { .. } => {}
        }
    }

    CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content: if content.is_empty() { None } else { Some(content) },
        tool_calls,
        finish_reason: stop_reason(api_response.stop_reason.as_deref()),
        usage: Usage::new(api_response.usage.input_tokens, api_response.usage.output_tokens),
    }
}

/// Streaming decoder state.
///
/// Input tokens are reported once in `message_start`; output tokens arrive
/// with the closing `message_delta`.
#[derive(Debug, Default)]
struct StreamDecoder {
    input_tokens: usize,
}

impl StreamDecoder {
    fn decode(&mut self, event: &str, data: &str) -> Option<StreamChunk> {
        match event {
            "message_start" => {
                let start: MessageStart = serde_json::from_str(data).ok()?;
                self.input_tokens = start.message.usage.input_tokens;
                None
            }
            "content_block_delta" => {
                let delta: ContentBlockDelta = serde_json::from_str(data).ok()?;
                match delta.delta {
                    DeltaContent::TextDelta { text } => Some(StreamChunk::Text(text)),
                    DeltaContent::Other => None,
                }
            }
            "message_delta" => {
                let delta: MessageDelta = serde_json::from_str(data).ok()?;
                let reason = delta.delta.stop_reason?;
                Some(StreamChunk::Done {
                    finish_reason: stop_reason(Some(&reason)),
                    usage: delta
                        .usage
                        .map(|u| Usage::new(self.input_tokens, u.output_tokens)),
                })
            }
            "error" => Some(StreamChunk::Error(data.to_string())),
            _ => None,
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    usage: StartUsage,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaContent {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<DeltaUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: usize,
}
