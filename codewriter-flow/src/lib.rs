//! # codewriter-flow
//!
//! The code-writer flow:
//! 1. Take a free-text requirement
//! 2. Ask the model for a Python implementation
//! 3. Hand requirement + code to a review crew, which tests and possibly fixes it
//! 4. Loop on the crew's `passed` flag, up to a fixed number of attempts
//! 5. Write the accepted code to disk
//!
//! The model does the writing, the crew does the judging; this crate only
//! moves state between them.

pub mod config;
pub mod crew;
pub mod extract;
pub mod flow;
pub mod graph;
pub mod prompt;
pub mod runner;
pub mod state;
pub mod tools;

pub use config::{CrewConfig, FlowConfig, RunnerConfig, DEFAULT_REQUIREMENT};
pub use crew::{CrewOutput, LlmReviewCrew, ReviewCrew, ReviewInputs};
pub use extract::{parse_json, strip_code_fence, ReviewVerdict};
pub use flow::{CodeWriterFlow, FlowReport, ReviewRound, Route};
pub use runner::{PythonRunner, RunOutcome};
pub use state::CodeState;
pub use tools::Toolbox;
