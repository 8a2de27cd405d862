//! Python runner: execute a file with a wall-clock limit and report what happened.
//!
//! The runner never fails. Every outcome, including a missing file or a
//! timeout, is a [`RunOutcome`] whose [`RunOutcome::report`] is the text handed
//! back to the review crew.

use crate::config::RunnerConfig;
use codewriter_error::{Error, ErrorKind, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Result of one script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The script ran to completion (any exit status)
    Completed {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    NotFound { path: PathBuf },
    TimedOut { limit: Duration },
    /// The interpreter could not be started
    SpawnFailed { message: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { exit_code: 0, .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Completed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Turn anything but a clean exit into an error, for callers that need a status
    pub fn ensure_success(&self, file_path: &str) -> Result<()> {
        let err = match self {
            RunOutcome::Completed { exit_code: 0, .. } => return Ok(()),
            RunOutcome::Completed { exit_code, .. } => {
                Error::new(ErrorKind::ScriptFailed, format!("script exited with {}", exit_code))
                    .with_context("path", file_path)
                    .with_context("exit_code", exit_code.to_string())
            }
            RunOutcome::NotFound { path } => Error::file_not_found(path.display().to_string()),
            RunOutcome::TimedOut { limit } => Error::script_timeout(file_path, describe_limit(*limit)),
            RunOutcome::SpawnFailed { message } => {
                Error::new(ErrorKind::ScriptFailed, message.clone()).with_context("path", file_path)
            }
        };
        Err(err.with_operation("python_runner::run"))
    }

    /// Render the text report
    pub fn report(&self) -> String {
        match self {
            RunOutcome::Completed {
                stdout,
                stderr,
                exit_code,
            } => {
                let mut output = String::new();
                if !stdout.is_empty() {
                    output.push_str(&format!("STDOUT:\n{}\n", stdout));
                }
                if !stderr.is_empty() {
                    output.push_str(&format!("STDERR:\n{}\n", stderr));
                }
                output.push_str(&format!("Return Code: {}\n", exit_code));
                if *exit_code == 0 {
                    output.push_str("✅ Execution successful!");
                } else {
                    output.push_str("❌ Execution failed!");
                }
                output
            }
            RunOutcome::NotFound { path } => {
                format!("Error: File '{}' not found.", path.display())
            }
            RunOutcome::TimedOut { limit } => {
                format!("Error: Script execution timed out ({} limit).", describe_limit(*limit))
            }
            RunOutcome::SpawnFailed { message } => {
                format!("Error executing Python file: {}", message)
            }
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report())
    }
}

fn describe_limit(limit: Duration) -> String {
    if limit.subsec_nanos() != 0 {
        return format!("{} ms", limit.as_millis());
    }
    match limit.as_secs() {
        1 => "1 second".to_string(),
        secs => format!("{} seconds", secs),
    }
}

/// Runs Python files as child processes
#[derive(Debug, Clone, Default)]
pub struct PythonRunner {
    config: RunnerConfig,
}

impl PythonRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Resolve `file_path` against the current working directory if it is relative
    pub fn resolve(file_path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = file_path.as_ref();
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }

    /// Run `file_path` with whitespace-separated `args`
    pub async fn run(&self, file_path: &str, args: &str) -> RunOutcome {
        let path = match Self::resolve(file_path) {
            Ok(path) => path,
            Err(e) => {
                return RunOutcome::SpawnFailed {
                    message: e.to_string(),
                }
            }
        };

        if !path.exists() {
            return RunOutcome::NotFound { path };
        }

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(&path)
            .args(args.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            interpreter = %self.config.interpreter,
            path = %path.display(),
            args,
            "running script"
        );

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunOutcome::SpawnFailed {
                    message: e.to_string(),
                }
            }
        };

        // dropping the wait future on timeout kills the child (kill_on_drop)
        match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => RunOutcome::Completed {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            },
            Ok(Err(e)) => RunOutcome::SpawnFailed {
                message: e.to_string(),
            },
            Err(_) => RunOutcome::TimedOut {
                limit: self.config.timeout,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh_runner(timeout: Duration) -> PythonRunner {
        PythonRunner::new(RunnerConfig {
            interpreter: "sh".into(),
            timeout,
            working_dir: None,
        })
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_report_format() {
        let outcome = RunOutcome::Completed {
            stdout: "55".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert_eq!(outcome.report(), "STDOUT:\n55\nReturn Code: 0\n✅ Execution successful!");

        let outcome = RunOutcome::Completed {
            stdout: String::new(),
            stderr: "Traceback".into(),
            exit_code: 1,
        };
        assert_eq!(outcome.report(), "STDERR:\nTraceback\nReturn Code: 1\n❌ Execution failed!");
    }

    #[test]
    fn test_ensure_success() {
        let ok = RunOutcome::Completed {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(ok.ensure_success("a.py").is_ok());

        let failed = RunOutcome::Completed {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 2,
        };
        let err = failed.ensure_success("a.py").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptFailed);
        assert_eq!(err.context_value("exit_code"), Some("2"));

        let timed_out = RunOutcome::TimedOut {
            limit: Duration::from_secs(10),
        };
        let err = timed_out.ensure_success("a.py").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScriptTimeout);
        assert!(err.is_retryable());
        assert_eq!(err.message(), "script exceeded 10 seconds limit");

        let sub_second = RunOutcome::TimedOut {
            limit: Duration::from_millis(300),
        };
        let err = sub_second.ensure_success("a.py").unwrap_err();
        assert_eq!(err.message(), "script exceeded 300 ms limit");
        assert_eq!(err.context_value("limit"), Some("300 ms"));
    }

    #[test]
    fn test_timeout_message() {
        let outcome = RunOutcome::TimedOut {
            limit: Duration::from_secs(10),
        };
        assert_eq!(outcome.report(), "Error: Script execution timed out (10 seconds limit).");
        assert_eq!(describe_limit(Duration::from_millis(250)), "250 ms");
    }

    #[test]
    fn test_relative_path_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(PythonRunner::resolve("tests/test_fib.py").unwrap(), cwd.join("tests/test_fib.py"));

        let absolute = cwd.join("x.py");
        assert_eq!(PythonRunner::resolve(&absolute).unwrap(), absolute);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let runner = PythonRunner::default();
        let outcome = runner.run("definitely/not/here.py", "").await;

        let expected = std::env::current_dir().unwrap().join("definitely/not/here.py");
        assert_eq!(outcome, RunOutcome::NotFound { path: expected.clone() });
        assert_eq!(
            outcome.report(),
            format!("Error: File '{}' not found.", expected.display())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_script() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "ok.sh", "echo hello\n");

        let outcome = sh_runner(Duration::from_secs(10)).run(&path, "").await;
        assert!(outcome.is_success());
        let report = outcome.report();
        assert!(report.contains("STDOUT:\nhello\n"));
        assert!(report.contains("Return Code: 0"));
        assert!(report.ends_with("✅ Execution successful!"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "fail.sh", "echo oops >&2\nexit 3\n");

        let outcome = sh_runner(Duration::from_secs(10)).run(&path, "").await;
        assert_eq!(outcome.exit_code(), Some(3));
        let report = outcome.report();
        assert!(report.contains("STDERR:\noops"));
        assert!(report.contains("Return Code: 3"));
        assert!(report.ends_with("❌ Execution failed!"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_are_split_on_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "args.sh", "echo \"$#:$1-$2\"\n");

        let outcome = sh_runner(Duration::from_secs(10)).run(&path, "  a \t b  ").await;
        assert!(outcome.report().contains("2:a-b"));

        let outcome = sh_runner(Duration::from_secs(10)).run(&path, "   ").await;
        assert!(outcome.report().contains("0:-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_does_not_block() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "slow.sh", "sleep 5\n");

        let started = Instant::now();
        let outcome = sh_runner(Duration::from_millis(300)).run(&path, "").await;

        assert_eq!(
            outcome,
            RunOutcome::TimedOut {
                limit: Duration::from_millis(300)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcome.report(), "Error: Script execution timed out (300 ms limit).");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "pwd.sh", "pwd\n");
        let runner = PythonRunner::new(RunnerConfig {
            interpreter: "sh".into(),
            timeout: Duration::from_secs(10),
            working_dir: Some(dir.path().to_path_buf()),
        });

        let report = runner.run(&path, "").await.report();
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(report.contains(&name));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "x.py", "print(1)\n");
        let runner = PythonRunner::new(RunnerConfig {
            interpreter: "codewriter-no-such-interpreter".into(),
            ..Default::default()
        });

        let outcome = runner.run(&path, "").await;
        assert!(matches!(outcome, RunOutcome::SpawnFailed { .. }));
        assert!(outcome.report().starts_with("Error executing Python file: "));
    }
}
