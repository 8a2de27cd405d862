//! Review crew: tests a candidate against its requirement and returns a verdict.
//!
//! The flow only sees [`ReviewCrew`]. [`LlmReviewCrew`] is the shipped
//! implementation: a model acting as a tester, with a file writer and the
//! Python runner as tools.

use crate::config::CrewConfig;
use crate::prompt;
use crate::runner::PythonRunner;
use crate::tools::Toolbox;
use codewriter_error::{Error, Result};
use codewriter_llm::{ChatMessage, CompletionRequest, LlmProvider, Usage};
use tracing::{debug, info};

/// File name the candidate is saved under inside the workspace
pub const SOLUTION_FILE: &str = "solution.py";

/// What the crew is asked to review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInputs {
    pub requirement: String,
    pub code: String,
}

impl ReviewInputs {
    pub fn new(requirement: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            code: code.into(),
        }
    }
}

/// Raw crew answer plus bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrewOutput {
    /// Final text; expected to hold a fenced JSON verdict
    pub raw: String,
    pub usage: Usage,
    pub tool_rounds: usize,
}

/// Anything that can review a candidate
#[allow(async_fn_in_trait)]
pub trait ReviewCrew: Send + Sync {
    async fn kickoff(&self, inputs: &ReviewInputs) -> Result<CrewOutput>;
}

/// A review crew backed by a tool-calling model
pub struct LlmReviewCrew<P> {
    provider: P,
    config: CrewConfig,
    toolbox: Toolbox,
}

impl<P: LlmProvider> LlmReviewCrew<P> {
    pub fn new(provider: P, config: CrewConfig) -> Self {
        let mut runner_config = config.runner.clone();
        if runner_config.working_dir.is_none() {
            runner_config.working_dir = Some(config.workspace.clone());
        }
        let toolbox = Toolbox::new(config.workspace.clone(), PythonRunner::new(runner_config));
        Self {
            provider,
            config,
            toolbox,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &CrewConfig {
        &self.config
    }

    fn request(&self, messages: Vec<ChatMessage>, with_tools: bool) -> CompletionRequest {
        let mut request =
            CompletionRequest::new(messages).with_model_opt(self.config.model.as_deref());
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if with_tools {
            request = request.with_tools(self.toolbox.definitions());
        }
        request
    }

    async fn prepare_workspace(&self, code: &str) -> Result<()> {
        let workspace = &self.config.workspace;
        tokio::fs::create_dir_all(workspace).await.map_err(|e| {
            Error::from(e)
                .with_operation("review_crew::prepare_workspace")
                .with_context("path", workspace.display().to_string())
        })?;

        let solution = workspace.join(SOLUTION_FILE);
        tokio::fs::write(&solution, code).await.map_err(|e| {
            Error::from(e)
                .with_operation("review_crew::prepare_workspace")
                .with_context("path", solution.display().to_string())
        })
    }
}

impl<P: LlmProvider> ReviewCrew for LlmReviewCrew<P> {
    async fn kickoff(&self, inputs: &ReviewInputs) -> Result<CrewOutput> {
        self.prepare_workspace(&inputs.code).await?;
        info!(
            workspace = %self.config.workspace.display(),
            provider = self.provider.name(),
            "review crew started"
        );

        let mut messages = vec![
            ChatMessage::system(prompt::REVIEWER_SYSTEM),
            ChatMessage::user(prompt::review_task(inputs, SOLUTION_FILE)),
        ];
        let mut usage = Usage::default();
        let mut tool_rounds = 0;

        while tool_rounds < self.config.max_tool_rounds {
            let response = self
                .provider
                .complete(self.request(messages.clone(), true))
                .await
                .map_err(|e| e.with_operation("review_crew::kickoff"))?;
            usage.add(&response.usage);

            if response.tool_calls.is_empty() {
                let raw = response
                    .into_text()
                    .map_err(|e| e.with_operation("review_crew::kickoff"))?;
                return Ok(CrewOutput {
                    raw,
                    usage,
                    tool_rounds,
                });
            }

            tool_rounds += 1;
            debug!(round = tool_rounds, calls = response.tool_calls.len(), "tool round");

            let calls = response.tool_calls;
            messages.push(ChatMessage::assistant_tool_calls(response.content, calls.clone()));
            for call in &calls {
                let result = self.toolbox.call(call).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }

        debug!(rounds = tool_rounds, "tool budget spent, asking for a verdict");
        messages.push(ChatMessage::user(prompt::FINAL_ANSWER));
        let response = self
            .provider
            .complete(self.request(messages, false))
            .await
            .map_err(|e| e.with_operation("review_crew::kickoff"))?;
        usage.add(&response.usage);
        let raw = response
            .into_text()
            .map_err(|e| e.with_operation("review_crew::kickoff"))?;

        Ok(CrewOutput {
            raw,
            usage,
            tool_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::tools::{RUN_PYTHON, WRITE_FILE};
    use codewriter_error::ErrorKind;
    use codewriter_llm::{Role, ScriptedProvider, ToolCall};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn crew(dir: &TempDir, provider: ScriptedProvider, max_tool_rounds: usize) -> LlmReviewCrew<ScriptedProvider> {
        LlmReviewCrew::new(
            provider,
            CrewConfig {
                workspace: dir.path().join("review"),
                max_tool_rounds,
                runner: RunnerConfig {
                    interpreter: "sh".into(),
                    timeout: Duration::from_secs(10),
                    working_dir: None,
                },
                ..Default::default()
            },
        )
    }

    const VERDICT: &str = "```json\n{\"passed\": true, \"code\": \"echo fixed\"}\n```";

    #[tokio::test]
    async fn test_answer_without_tools() {
        let dir = TempDir::new().unwrap();
        let crew = crew(&dir, ScriptedProvider::new().push_text(VERDICT), 8);

        let output = crew.kickoff(&ReviewInputs::new("say hi", "echo hi")).await.unwrap();

        assert_eq!(output.raw, VERDICT);
        assert_eq!(output.tool_rounds, 0);
        assert_eq!(output.usage.total_tokens, 15);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("review").join(SOLUTION_FILE)).unwrap(),
            "echo hi"
        );

        let requests = crew.provider().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[1].text().contains("say hi"));
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_results_are_fed_back() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new()
            .push_tool_calls(vec![ToolCall::new(
                "call_1",
                WRITE_FILE,
                json!({"path": "test_solution.sh", "content": "sh solution.py\n"}),
            )])
            .push_tool_calls(vec![ToolCall::new(
                "call_2",
                RUN_PYTHON,
                json!({"file_path": "test_solution.sh"}),
            )])
            .push_text(VERDICT);
        let crew = crew(&dir, provider, 8);

        let output = crew.kickoff(&ReviewInputs::new("say hi", "echo hi")).await.unwrap();
        assert_eq!(output.tool_rounds, 2);
        assert_eq!(output.usage.total_tokens, 45);

        let requests = crew.provider().requests();
        assert_eq!(requests.len(), 3);

        let second = &requests[1].messages;
        let write_result = second.last().unwrap();
        assert_eq!(write_result.role, Role::Tool);
        assert_eq!(write_result.tool_call_id.as_deref(), Some("call_1"));
        assert!(write_result.text().starts_with("Wrote "));

        // the test script ran with the workspace as its working directory
        let run_result = requests[2].messages.last().unwrap();
        assert_eq!(run_result.tool_call_id.as_deref(), Some("call_2"));
        assert!(run_result.text().contains("STDOUT:\nhi"));
        assert!(run_result.text().ends_with("✅ Execution successful!"));
    }

    #[tokio::test]
    async fn test_tool_budget_forces_final_answer() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new()
            .push_tool_calls(vec![ToolCall::new(
                "call_1",
                WRITE_FILE,
                json!({"path": "../outside.py", "content": "x"}),
            )])
            .push_text(VERDICT);
        let crew = crew(&dir, provider, 1);

        let output = crew.kickoff(&ReviewInputs::new("r", "c")).await.unwrap();
        assert_eq!(output.tool_rounds, 1);
        assert!(!dir.path().join("outside.py").exists());

        let requests = crew.provider().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_none());
        assert_eq!(requests[1].messages.last().unwrap().text(), prompt::FINAL_ANSWER);

        let refused = &requests[1].messages[requests[1].messages.len() - 2];
        assert!(refused.text().starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let dir = TempDir::new().unwrap();
        let crew = crew(&dir, ScriptedProvider::new(), 8);

        let err = crew.kickoff(&ReviewInputs::new("r", "c")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert_eq!(err.operation(), "review_crew::kickoff");
        assert_eq!(err.context_value("called"), Some("scripted::complete"));
    }
}
