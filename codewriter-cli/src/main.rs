//! # codewriter CLI
//!
//! Generate Python code for a requirement, iterate it through review until it
//! passes, and write it to disk.
//!
//! Usage:
//!   codewriter [OPTIONS] [REQUIREMENT]...
//!   codewriter run [REQUIREMENT]...
//!   codewriter exec <FILE> [ARGS]...
//!   codewriter extract [FILE]
//!   codewriter plot [--output PATH]
//!
//! Examples:
//!   codewriter "checks whether a string is a palindrome"
//!   codewriter --provider anthropic --max-attempts 3 run "parses ISO dates"
//!   codewriter exec output/code.py 10

mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use codewriter_error::{Error, Result};
use codewriter_flow::{
    graph, parse_json, CodeWriterFlow, CrewConfig, FlowConfig, LlmReviewCrew, PythonRunner,
    RunnerConfig,
};
use codewriter_llm::{Provider, ProviderConfig, ProviderType};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "codewriter")]
#[command(author, version, about = "codewriter - LLM-written Python code, reviewed until it passes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Requirement to implement (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    requirement: Vec<String>,

    /// Model backend
    #[arg(long, value_enum, default_value = "gemini", env = "CODEWRITER_PROVIDER", global = true)]
    provider: Backend,

    /// Model name, defaults to the backend's own default
    #[arg(long, env = "CODEWRITER_MODEL", global = true)]
    model: Option<String>,

    /// Override the backend's API base URL
    #[arg(long, env = "CODEWRITER_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Maximum review cycles before giving up
    #[arg(long, default_value_t = 5, global = true)]
    max_attempts: usize,

    /// Where the accepted code is written
    #[arg(long, default_value = "output/code.py", global = true)]
    output: PathBuf,

    /// Scratch directory for the review crew
    #[arg(long, default_value = "output/review", global = true)]
    workspace: PathBuf,

    /// Python interpreter used to run code
    #[arg(long, default_value = "python3", env = "CODEWRITER_PYTHON", global = true)]
    python: String,

    /// Wall-clock limit for each script run
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    timeout_secs: u64,

    /// Print generated code as it streams in
    #[arg(long, global = true)]
    stream: bool,

    /// Read the requirement from stdin
    #[arg(short, long, global = true)]
    interactive: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the code-writer flow
    Run {
        /// The requirement
        #[arg(trailing_var_arg = true)]
        requirement: Vec<String>,
    },
    /// Run a Python file and print the runner's report
    Exec {
        file: String,

        /// Arguments passed to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the JSON block found in a file (or stdin)
    Extract {
        file: Option<PathBuf>,

        /// Parse the block and pretty-print it
        #[arg(long)]
        pretty: bool,
    },
    /// Write the flow graph as an HTML page
    Plot {
        #[arg(long, default_value = "code_writer_flow.html")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Gemini,
    Openai,
    Anthropic,
    Ollama,
}

impl From<Backend> for ProviderType {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Gemini => ProviderType::Gemini,
            Backend::Openai => ProviderType::OpenAI,
            Backend::Anthropic => ProviderType::Anthropic,
            Backend::Ollama => ProviderType::Local,
        }
    }
}

impl Cli {
    fn provider_config(&self) -> Result<ProviderConfig> {
        let mut config = ProviderConfig::from_env(self.provider.into())?;
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        Ok(config)
    }

    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            interpreter: self.python.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            working_dir: None,
        }
    }
}

async fn read_requirement(args: &[String], interactive: bool) -> Result<String> {
    if !interactive {
        return Ok(args.join(" "));
    }
    eprint!("What do you want to achieve with your Python code? ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

async fn run_flow(cli: &Cli, requirement: &[String]) -> Result<()> {
    let requirement = read_requirement(requirement, cli.interactive).await?;

    let provider_config = cli.provider_config()?;
    let writer = Provider::from_config(provider_config.clone())?;
    let reviewer = Provider::from_config(provider_config)?;

    let crew = LlmReviewCrew::new(
        reviewer,
        CrewConfig {
            workspace: cli.workspace.clone(),
            runner: cli.runner_config(),
            ..Default::default()
        },
    );
    let config = FlowConfig {
        output_path: cli.output.clone(),
        max_attempts: cli.max_attempts,
        ..Default::default()
    };

    let mut flow = CodeWriterFlow::new(writer, crew, config);
    if cli.stream {
        flow = flow.with_stream_callback(|delta| {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        });
    }

    let report = flow.kickoff(&requirement).await?;
    if cli.stream {
        println!();
    }

    info!(
        attempts = report.attempts(),
        calls = report.usage.total_calls,
        tokens = report.usage.total_tokens(),
        "flow complete"
    );
    println!("\n=== Flow Complete ===");
    println!("Open {} to view it.", report.output_path.display());
    Ok(())
}

async fn exec_file(cli: &Cli, file: &str, args: &[String]) -> Result<()> {
    let runner = PythonRunner::new(cli.runner_config());
    let outcome = runner.run(file, &args.join(" ")).await;
    println!("{}", outcome.report());
    outcome.ensure_success(file)
}

async fn extract(file: Option<&Path>, pretty: bool) -> Result<()> {
    let raw = match file {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::from(e)
                .with_operation("cli::extract")
                .with_context("path", path.display().to_string())
        })?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };

    let block = parse_json(&raw);
    if pretty {
        let value: serde_json::Value = serde_json::from_str(block).map_err(|e| {
            Error::parse_failed(format!("not valid JSON: {}", e))
                .with_operation("cli::extract")
                .set_source(e)
        })?;
        let text = serde_json::to_string_pretty(&value).map_err(|e| {
            Error::serialization_failed(e.to_string())
                .with_operation("cli::extract")
                .set_source(e)
        })?;
        println!("{}", text);
    } else {
        println!("{}", block);
    }
    Ok(())
}

async fn plot(output: &Path) -> Result<()> {
    tokio::fs::write(output, graph::render_html("Code Writer Flow"))
        .await
        .map_err(|e| {
            Error::from(e)
                .with_operation("cli::plot")
                .with_context("path", output.display().to_string())
        })?;
    println!("Flow visualization saved to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Some(Commands::Run { requirement }) => run_flow(&cli, requirement).await,
        Some(Commands::Exec { file, args }) => exec_file(&cli, file, args).await,
        Some(Commands::Extract { file, pretty }) => extract(file.as_deref(), *pretty).await,
        Some(Commands::Plot { output }) => plot(output).await,
        None => run_flow(&cli, &cli.requirement).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
