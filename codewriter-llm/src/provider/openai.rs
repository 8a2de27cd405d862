//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Gemini's OpenAI endpoint, Ollama, vLLM and anything else
//! that serves `/chat/completions`.

use super::sse::SseBuffer;
use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> OpenAIRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        OpenAIRequest {
            model,
            messages: request.messages.into_iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
            tools: request.tools.map(|tools| tools.into_iter().map(OpenAITool::from).collect()),
            tool_choice: request.tool_choice.map(|tc| match tc {
                ToolChoice::Auto => serde_json::json!("auto"),
                ToolChoice::None => serde_json::json!("none"),
                ToolChoice::Required => serde_json::json!("required"),
                ToolChoice::Function { name } => serde_json::json!({
                    "type": "function",
                    "function": { "name": name }
                }),
            }),
            stop: request.stop,
        }
    }

    async fn send(&self, body: &OpenAIRequest, operation: &'static str) -> Result<reqwest::Response> {
        debug!(model = %body.model, messages = body.messages.len(), "openai request");

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(body);

        if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(api_key);
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

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(request, false);
        let response = self.send(&body, "openai::complete").await?;

        let api_response: OpenAIResponse = response.json().await.map_err(|e| {
            Error::parse_failed("undecodable chat completion")
                .with_operation("openai::complete")
                .set_source(e)
        })?;

        into_completion(api_response)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let body = self.build_request(request, true);
        let response = self.send(&body, "openai::stream").await?;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut sse = SseBuffer::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                };
                for event in sse.push(&chunk) {
                    if event.data == "[DONE]" {
                        return;
                    }
                    for item in decode_stream_event(&event.data) {
                        yield item;
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

fn into_completion(api_response: OpenAIResponse) -> Result<CompletionResponse> {
    let choice = api_response.choices.into_iter().next().ok_or_else(|| {
        Error::inference_failed("no choices in response").with_operation("openai::complete")
    })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let usage = api_response
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        id: api_response.id.unwrap_or_default(),
        model: api_response.model.unwrap_or_default(),
        content: choice.message.content,
        tool_calls,
        finish_reason: finish_reason(choice.finish_reason.as_deref()),
        usage,
    })
}

/// Decode one `data:` payload of a streaming response. Unknown payloads are skipped.
fn decode_stream_event(data: &str) -> Vec<StreamChunk> {
    let Ok(chunk) = serde_json::from_str::<OpenAIStreamChunk>(data) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let usage = chunk.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(StreamChunk::Text(content));
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk::Done {
                finish_reason: finish_reason(Some(&reason)),
                usage,
            });
        }
    } else if usage.is_some() {
        out.push(StreamChunk::Done {
            finish_reason: FinishReason::Stop,
            usage,
        });
    }
    out
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

/// Asks for a trailing usage-only chunk on streamed responses
#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<ChatMessage> for OpenAIMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().into(),
            content: msg.content,
            tool_calls: msg.tool_calls.map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OpenAIToolCall {
                        id: tc.id,
                        r#type: "function".into(),
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

impl From<ToolDefinition> for OpenAITool {
    fn from(tool: ToolDefinition) -> Self {
        Self {
            r#type: "function".into(),
            function: OpenAIFunction {
                name: tool.name,
                description: Some(tool.description),
                parameters: Some(tool.parameters),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::new(ProviderConfig::gemini("key")).unwrap()
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are a Senior Python Programmer."),
            ChatMessage::user("Implement a Python function that adds"),
        ])
        .with_tools(vec![ToolDefinition::new("run_python", "Run a file")])
        .with_tool_choice(ToolChoice::Auto);

        let body = serde_json::to_value(provider().build_request(request, false)).unwrap();
        assert_eq!(body["model"], "gemini-2.5-flash");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "run_python");
        assert_eq!(body["tool_choice"], "auto");
        assert!(body.get("temperature").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_tool_messages_round_trip_to_wire() {
        let call = ToolCall::new("call_9", "write_file", serde_json::json!({"path": "a.py"}));
        let request = CompletionRequest::new(vec![
            ChatMessage::assistant_tool_calls(None, vec![call]),
            ChatMessage::tool_result("call_9", "wrote 10 bytes"),
        ]);

        let body = serde_json::to_value(provider().build_request(request, true)).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["tool_calls"][0]["id"], "call_9");
        assert_eq!(body["messages"][0]["tool_calls"][0]["function"]["name"], "write_file");
        assert_eq!(body["messages"][1]["role"], "tool");
        assert_eq!(body["messages"][1]["tool_call_id"], "call_9");
    }

    #[test]
    fn test_response_decoding() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gemini-2.5-flash",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "run_python", "arguments": "{\"file_path\":\"t.py\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });

        let response = into_completion(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "run_python");
        assert_eq!(response.usage.total_tokens, 15);
        assert!(response.content.is_none());
    }

    #[test]
    fn test_response_without_choices() {
        let raw = serde_json::json!({"id": "x", "model": "m", "choices": []});
        let err = into_completion(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert_eq!(err.kind(), codewriter_error::ErrorKind::InferenceFailed);
    }

    #[test]
    fn test_stream_event_decoding() {
        let text = decode_stream_event(r#"{"choices":[{"delta":{"content":"def"},"finish_reason":null}]}"#);
        assert_eq!(text, vec![StreamChunk::Text("def".into())]);

        let done = decode_stream_event(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert_eq!(
            done,
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: None
            }]
        );

        assert!(decode_stream_event("not json").is_empty());
    }

    #[test]
    fn test_stream_usage_arrives_after_finish() {
        let finish = decode_stream_event(r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":null}"#);
        assert_eq!(
            finish,
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: None
            }]
        );

        let usage = decode_stream_event(
            r#"{"choices":[],"usage":{"prompt_tokens":40,"completion_tokens":9,"total_tokens":49}}"#,
        );
        assert_eq!(
            usage,
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage {
                    prompt_tokens: 40,
                    completion_tokens: 9,
                    total_tokens: 49
                })
            }]
        );
    }
}
