//! Scripted provider: replays queued responses instead of calling a model.
//!
//! Used by the flow and crew tests, and handy for exercising the CLI offline.

use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct ScriptedProvider {
    model: String,
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted".into(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text answer
    pub fn push_text(self, text: impl Into<String>) -> Self {
        let response = self.response(Some(text.into()), Vec::new(), FinishReason::Stop);
        self.push(response)
    }

    /// Queue an answer that requests tool calls
    pub fn push_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        let response = self.response(None, calls, FinishReason::ToolCalls);
        self.push(response)
    }

    pub fn push(self, response: CompletionResponse) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }

    fn response(&self, content: Option<String>, tool_calls: Vec<ToolCall>, finish_reason: FinishReason) -> CompletionResponse {
        CompletionResponse {
            id: format!("scripted-{}", self.remaining() + 1),
            model: self.model.clone(),
            content,
            tool_calls,
            finish_reason,
            usage: Usage::new(10, 5),
        }
    }

    fn next(&self, request: CompletionRequest, operation: &'static str) -> Result<CompletionResponse> {
        lock(&self.requests).push(request);
        lock(&self.responses).pop_front().ok_or_else(|| {
            Error::inference_failed("no scripted responses left").with_operation(operation)
        })
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.next(request, "scripted::complete")
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let response = self.next(request, "scripted::stream")?;

        // one chunk per line keeps the callback path honest
        let mut chunks: Vec<StreamChunk> = response
            .content
            .unwrap_or_default()
            .split_inclusive('\n')
            .map(|line| StreamChunk::Text(line.to_string()))
            .collect();
        chunks.push(StreamChunk::Done {
            finish_reason: response.finish_reason,
            usage: Some(response.usage),
        });

        Ok(StreamReceiver::new(futures_util::stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records_requests() {
        let provider = ScriptedProvider::new().push_text("first").push_text("second");
        let ask = |text: &str| CompletionRequest::new(vec![ChatMessage::user(text)]);

        let first = provider.complete(ask("a")).await.unwrap();
        assert_eq!(first.into_text().unwrap(), "first");
        let second = provider.complete(ask("b")).await.unwrap();
        assert_eq!(second.into_text().unwrap(), "second");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages[0].text(), "b");
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let provider = ScriptedProvider::new();
        let err = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("anything")]))
            .await
            .unwrap_err();
        assert_eq!(err.operation(), "scripted::complete");
    }

    #[tokio::test]
    async fn test_stream_splits_lines() {
        let provider = ScriptedProvider::new().push_text("a\nb\n");
        let mut seen = Vec::new();
        let (text, usage) = provider
            .stream(CompletionRequest::default())
            .await
            .unwrap()
            .collect_text_with(|t| seen.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(text, "a\nb\n");
        assert_eq!(seen, vec!["a\n", "b\n"]);
        assert_eq!(usage, Some(Usage::new(10, 5)));
    }
}
