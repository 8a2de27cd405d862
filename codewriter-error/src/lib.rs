//! # codewriter-error
//!
//! Unified error handling for codewriter.
//!
//! ## Design
//!
//! - **ErrorKind**: what went wrong (e.g. `RateLimited`, `AttemptsExhausted`)
//! - **ErrorStatus**: how a caller may treat it (Permanent, Temporary, Persistent)
//! - **Context**: operation chain plus key/value pairs for locating the cause
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use codewriter_error::{Error, ErrorKind};
//!
//! fn review() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::AttemptsExhausted, "code never passed review")
//!         .with_operation("flow::kickoff")
//!         .with_context("attempts", "5"))
//! }
//! # assert!(review().is_err());
//! ```
//!
//! ## Principles
//!
//! - Library functions return `Result<T, codewriter_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - An error is classified once; callers further up only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the codewriter Error
pub type Result<T> = std::result::Result<T, Error>;
