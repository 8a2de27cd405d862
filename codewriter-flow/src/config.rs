//! Configuration for the flow, the review crew and the runner

use codewriter_error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Requirement used when the caller supplies none
pub const DEFAULT_REQUIREMENT: &str = "Write a Python function to calculate the Fibonacci sequence";

/// Configuration for [`crate::CodeWriterFlow`]
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    /// Where the accepted code is written
    pub output_path: PathBuf,
    /// Upper bound on review cycles
    pub max_attempts: usize,
    /// Model override for code generation; `None` uses the provider default
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output/code.py"),
            max_attempts: 5,
            model: None,
            temperature: None,
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config_invalid("max_attempts must be at least 1")
                .with_operation("flow_config::validate"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(Error::config_invalid("output path is empty")
                .with_operation("flow_config::validate"));
        }
        Ok(())
    }
}

/// Configuration for [`crate::LlmReviewCrew`]
#[derive(Debug, Clone, PartialEq)]
pub struct CrewConfig {
    /// Scratch directory holding the candidate and the tests
    pub workspace: PathBuf,
    /// Tool rounds before the crew is told to answer
    pub max_tool_rounds: usize,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub runner: RunnerConfig,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("output/review"),
            max_tool_rounds: 8,
            model: None,
            temperature: None,
            runner: RunnerConfig::default(),
        }
    }
}

/// Configuration for [`crate::PythonRunner`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Interpreter executable, looked up on `PATH`
    pub interpreter: String,
    pub timeout: Duration,
    /// Working directory for the child; `None` inherits ours
    pub working_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(10),
            working_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codewriter_error::ErrorKind;

    #[test]
    fn test_defaults() {
        let flow = FlowConfig::default();
        assert_eq!(flow.output_path, PathBuf::from("output/code.py"));
        assert_eq!(flow.max_attempts, 5);
        assert!(flow.validate().is_ok());

        let runner = RunnerConfig::default();
        assert_eq!(runner.timeout, Duration::from_secs(10));
        assert_eq!(runner.interpreter, "python3");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = FlowConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }
}
