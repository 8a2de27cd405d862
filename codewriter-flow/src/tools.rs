//! Tools the review crew can call.
//!
//! Every tool answers with text. Bad arguments and refused paths come back as
//! `Error: ...` strings for the model to read, not as Rust errors.

use crate::runner::PythonRunner;
use codewriter_llm::{ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const WRITE_FILE: &str = "write_file";
pub const RUN_PYTHON: &str = "run_python";

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RunPythonArgs {
    file_path: String,
    #[serde(default)]
    args: String,
}

/// A workspace directory plus the runner that executes files in it
#[derive(Debug, Clone)]
pub struct Toolbox {
    workspace: PathBuf,
    runner: PythonRunner,
}

impl Toolbox {
    pub fn new(workspace: impl Into<PathBuf>, runner: PythonRunner) -> Self {
        Self {
            workspace: workspace.into(),
            runner,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                WRITE_FILE,
                "Write a text file inside the workspace, replacing it if it exists. \
                 Use relative paths such as 'test_solution.py'.",
            )
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path relative to the workspace"},
                    "content": {"type": "string", "description": "Full file contents"}
                },
                "required": ["path", "content"]
            })),
            ToolDefinition::new(
                RUN_PYTHON,
                "Python Code Runner: execute a Python file and return its output. \
                 Reports stdout, stderr and the return code.",
            )
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Path of the Python file, relative to the workspace"},
                    "args": {"type": "string", "description": "Command line arguments separated by spaces"}
                },
                "required": ["file_path"]
            })),
        ]
    }

    /// Execute one tool call and render its result
    pub async fn call(&self, call: &ToolCall) -> String {
        debug!(tool = %call.name, arguments = %call.arguments, "tool call");
        let result = match call.name.as_str() {
            WRITE_FILE => match call.parse_arguments::<WriteFileArgs>() {
                Ok(args) => self.write_file(&args.path, &args.content).await,
                Err(e) => format!("Error: {}", e.message()),
            },
            RUN_PYTHON => match call.parse_arguments::<RunPythonArgs>() {
                Ok(args) => self.run_python(&args.file_path, &args.args).await,
                Err(e) => format!("Error: {}", e.message()),
            },
            other => format!("Error: unknown tool '{}'", other),
        };
        debug!(tool = %call.name, result = %result, "tool result");
        result
    }

    pub async fn write_file(&self, path: &str, content: &str) -> String {
        let target = match self.confine(path) {
            Ok(target) => target,
            Err(msg) => return msg,
        };
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return format!("Error: cannot create '{}': {}", parent.display(), e);
            }
        }
        match tokio::fs::write(&target, content).await {
            Ok(()) => format!("Wrote {} bytes to {}", content.len(), path),
            Err(e) => format!("Error: cannot write '{}': {}", path, e),
        }
    }

    pub async fn run_python(&self, file_path: &str, args: &str) -> String {
        match self.confine(file_path) {
            Ok(target) => self.runner.run(&target.to_string_lossy(), args).await.report(),
            Err(msg) => msg,
        }
    }

    /// Map a model-supplied path into the workspace, refusing escapes
    fn confine(&self, path: &str) -> Result<PathBuf, String> {
        let relative = Path::new(path.trim());
        if relative.as_os_str().is_empty() {
            return Err("Error: empty path".to_string());
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(format!("Error: path '{}' must not contain '..'", path))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(format!("Error: path '{}' must be relative to the workspace", path))
                }
            }
        }
        Ok(self.workspace.join(relative))
    }
}
