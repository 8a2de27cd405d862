//! The code-writer flow.
//!
//! ```text
//! get_user_input -> write_python_code -> test_and_fix_code -> review_result
//!                                              ^                   |
//!                                              +----- Iterate -----+
//!                                                                  |
//!                                              finalize_code <- Terminate
//! ```
//!
//! Review cycles are capped by [`FlowConfig::max_attempts`]. Model and crew
//! errors end the run; an unreadable verdict only fails the cycle.

use crate::config::{FlowConfig, DEFAULT_REQUIREMENT};
use crate::crew::{ReviewCrew, ReviewInputs};
use crate::extract::{strip_code_fence, ReviewVerdict};
use crate::prompt;
use crate::state::CodeState;
use codewriter_error::{Error, Result};
use codewriter_llm::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Label the crew's token usage is tracked under
const CREW_USAGE_LABEL: &str = "review-crew";

/// Where the router sends the flow after a review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Terminate,
    Iterate,
}

/// One review cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRound {
    /// 1-based
    pub attempt: usize,
    pub passed: bool,
    /// Set when the crew's answer could not be read as a verdict
    pub parse_error: Option<String>,
    pub notes: Option<String>,
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub requirement: String,
    pub code: String,
    pub output_path: PathBuf,
    pub rounds: Vec<ReviewRound>,
    pub usage: UsageTracker,
}

impl FlowReport {
    pub fn attempts(&self) -> usize {
        self.rounds.len()
    }
}

type TokenCallback = Box<dyn FnMut(&str) + Send>;

pub struct CodeWriterFlow<P, C> {
    provider: P,
    crew: C,
    config: FlowConfig,
    state: CodeState,
    rounds: Vec<ReviewRound>,
    usage: UsageTracker,
    on_token: Option<TokenCallback>,
}

impl<P: LlmProvider, C: ReviewCrew> CodeWriterFlow<P, C> {
    pub fn new(provider: P, crew: C, config: FlowConfig) -> Self {
        Self {
            provider,
            crew,
            config,
            state: CodeState::default(),
            rounds: Vec::new(),
            usage: UsageTracker::new(),
            on_token: None,
        }
    }

    /// Stream code generation, handing each text delta to `on_token`
    pub fn with_stream_callback<F>(mut self, on_token: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_token = Some(Box::new(on_token));
        self
    }

    pub fn state(&self) -> &CodeState {
        &self.state
    }

    pub fn rounds(&self) -> &[ReviewRound] {
        &self.rounds
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn crew(&self) -> &C {
        &self.crew
    }

    /// Store the requirement; a blank one falls back to [`DEFAULT_REQUIREMENT`]
    pub fn get_user_input(&mut self, requirement: &str) -> &CodeState {
        info!("=== Write Your Python Code ===");
        let requirement = match requirement.trim() {
            "" => DEFAULT_REQUIREMENT,
            given => given,
        };
        self.state = CodeState::new(requirement);
        info!(requirement = %self.state.requirement, "generating Python code");
        &self.state
    }

    /// Ask the model for an implementation of the requirement
    pub async fn write_python_code(&mut self) -> Result<()> {
        info!("writing Python code");

        let mut request = CompletionRequest::new(vec![
            ChatMessage::system(prompt::CODER_SYSTEM),
            ChatMessage::user(prompt::write_code(&self.state.requirement)),
        ])
        .with_model_opt(self.config.model.as_deref());
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        let text = match self.on_token.as_mut() {
            Some(on_token) => {
                let (text, usage) = self
                    .provider
                    .stream(request)
                    .await
                    .map_err(|e| e.with_operation("code_writer_flow::write_python_code"))?
                    .collect_text_with(|delta| on_token(delta))
                    .await
                    .map_err(|e| e.with_operation("code_writer_flow::write_python_code"))?;
                if let Some(usage) = usage {
                    self.usage.track(&model, &usage);
                }
                if text.trim().is_empty() {
                    return Err(Error::empty_response(model)
                        .with_operation("code_writer_flow::write_python_code"));
                }
                text
            }
            None => {
                let response = self
                    .provider
                    .complete(request)
                    .await
                    .map_err(|e| e.with_operation("code_writer_flow::write_python_code"))?;
                self.usage.track(&response.model, &response.usage);
                response
                    .into_text()
                    .map_err(|e| e.with_operation("code_writer_flow::write_python_code"))?
            }
        };

        self.state.code = strip_code_fence(&text).to_string();
        debug!(code = %self.state.code, "generated code");
        Ok(())
    }

    /// Run one review cycle and return whether the code passed.
    ///
    /// The crew's revised code, when it sends any, replaces the current code.
    pub async fn test_and_fix_code(&mut self) -> Result<bool> {
        let attempt = self.rounds.len() + 1;
        info!(attempt, "testing and fixing code");

        let inputs = ReviewInputs::new(self.state.requirement.clone(), self.state.code.clone());
        let output = self
            .crew
            .kickoff(&inputs)
            .await
            .map_err(|e| e.with_operation("code_writer_flow::test_and_fix_code"))?;
        self.usage.track(CREW_USAGE_LABEL, &output.usage);
        debug!(tool_rounds = output.tool_rounds, raw = %output.raw, "crew answered");

        let round = match ReviewVerdict::from_crew_output(&output.raw) {
            Ok(verdict) => {
                if let Some(code) = verdict.code.as_deref().map(strip_code_fence) {
                    if !code.is_empty() {
                        self.state.code = code.to_string();
                    }
                }
                ReviewRound {
                    attempt,
                    passed: verdict.passed,
                    parse_error: None,
                    notes: verdict.notes,
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "unreadable review verdict, counting as failed");
                ReviewRound {
                    attempt,
                    passed: false,
                    parse_error: Some(e.message().to_string()),
                    notes: None,
                }
            }
        };

        let passed = round.passed;
        self.rounds.push(round);
        Ok(passed)
    }

    pub fn review_result(&self, passed: bool) -> Route {
        if passed {
            info!("all tests passed, code is ready");
            Route::Terminate
        } else {
            warn!(attempt = self.rounds.len(), "code needs fixing");
            Route::Iterate
        }
    }

    /// Write the accepted code to the output path, replacing any earlier file
    pub async fn finalize_code(&self) -> Result<PathBuf> {
        info!("finalizing code");
        if !self.state.has_code() {
            return Err(Error::review_failed("review passed but left no code to write")
                .with_operation("code_writer_flow::finalize_code"));
        }

        let path = self.config.output_path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::from(e)
                    .with_operation("code_writer_flow::finalize_code")
                    .with_context("path", parent.display().to_string())
            })?;
        }
        tokio::fs::write(&path, &self.state.code).await.map_err(|e| {
            Error::from(e)
                .with_operation("code_writer_flow::finalize_code")
                .with_context("path", path.display().to_string())
        })?;

        info!(path = %path.display(), "code written");
        Ok(path)
    }

    /// Run the whole flow for `requirement`
    pub async fn kickoff(&mut self, requirement: &str) -> Result<FlowReport> {
        self.config.validate()?;
        self.rounds.clear();
        self.usage = UsageTracker::new();

        self.get_user_input(requirement);
        self.write_python_code().await?;

        for _ in 0..self.config.max_attempts {
            let passed = self.test_and_fix_code().await?;
            match self.review_result(passed) {
                Route::Terminate => {
                    let output_path = self.finalize_code().await?;
                    return Ok(FlowReport {
                        requirement: self.state.requirement.clone(),
                        code: self.state.code.clone(),
                        output_path,
                        rounds: self.rounds.clone(),
                        usage: self.usage.clone(),
                    });
                }
                Route::Iterate => continue,
            }
        }

        Err(Error::attempts_exhausted(self.config.max_attempts)
            .with_operation("code_writer_flow::kickoff"))
    }
}
