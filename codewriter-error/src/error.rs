//! The main Error type for codewriter

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all codewriter operations.
///
/// - `kind`: what type of error occurred
/// - `message`: human-readable description
/// - `status`: whether the error is retryable
/// - `operation`: what operation raised it
/// - `context`: key-value pairs for debugging
/// - `source`: the underlying error (if any)
///
/// # Example
///
/// ```rust
/// use codewriter_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::RateLimited, "429 from provider")
///     .with_operation("openai::complete")
///     .with_context("model", "gemini-2.5-flash");
///
/// assert_eq!(err.kind(), ErrorKind::RateLimited);
/// assert!(err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up the first context value recorded under `key`
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }


    /// Set the operation that raised this error.
    ///
    /// A previously set operation is moved into the context under `called`,
    /// so the chain of operations survives.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if a source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Mark as persistent after retries gave up
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// Display: compact, single line, for logs
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// Debug: multi-line, includes the source chain
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    /// The model answered, but with no text content
    pub fn empty_response(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(ErrorKind::EmptyResponse, format!("model '{}' returned no content", model))
            .with_context("model", model)
    }

    /// Map a non-success HTTP status from a provider to an error kind
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::AuthenticationFailed,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ProviderUnavailable,
            _ => ErrorKind::InferenceFailed,
        };
        Self::new(kind, body).with_context("http_status", status.to_string())
    }

    pub fn network_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkFailed, message)
    }

    pub fn review_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReviewFailed, message)
    }

    pub fn attempts_exhausted(attempts: usize) -> Self {
        Self::new(
            ErrorKind::AttemptsExhausted,
            format!("code did not pass review after {} attempts", attempts),
        )
        .with_context("attempts", attempts.to_string())
    }

    /// `limit` is already rendered, e.g. `10 seconds` or `300 ms`
    pub fn script_timeout(path: impl Into<String>, limit: impl Into<String>) -> Self {
        let limit = limit.into();
        Self::new(ErrorKind::ScriptTimeout, format!("script exceeded {} limit", limit))
            .with_context("limit", limit)
            .with_context("path", path)
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorKind::FileNotFound, format!("file '{}' not found", path))
            .with_context("path", path)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }

    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::ReviewFailed, "crew returned nothing");
        assert_eq!(err.kind(), ErrorKind::ReviewFailed);
        assert_eq!(err.message(), "crew returned nothing");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::InferenceFailed, "timeout")
            .with_operation("flow::write_python_code")
            .with_context("model", "gemini-2.5-flash")
            .with_context("attempt", "2");

        assert_eq!(err.operation(), "flow::write_python_code");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context_value("attempt"), Some("2"));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("flow::finalize_code")
            .with_operation("flow::kickoff");

        assert_eq!(err.operation(), "flow::kickoff");
        assert_eq!(err.context()[0], ("called", "flow::finalize_code".to_string()));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::from_http_status(401, "").kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(Error::from_http_status(429, "").kind(), ErrorKind::RateLimited);
        assert_eq!(Error::from_http_status(503, "").kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(Error::from_http_status(400, "bad").kind(), ErrorKind::InferenceFailed);
        assert!(Error::from_http_status(429, "").is_retryable());
        assert_eq!(Error::from_http_status(400, "").context_value("http_status"), Some("400"));
    }

    #[test]
    fn test_persist() {
        let err = Error::network_failed("connection refused");
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::attempts_exhausted(5).with_operation("flow::kickoff");

        let display = err.to_string();
        assert!(display.contains("AttemptsExhausted"));
        assert!(display.contains("permanent"));
        assert!(display.contains("flow::kickoff"));
        assert!(display.contains("attempts: 5"));
    }

    #[test]
    fn test_display_without_operation() {
        let err = Error::unexpected("boom");
        assert_eq!(err.to_string(), "Unexpected (permanent) => boom");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
    }

    #[test]
    fn test_set_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::parse_failed("verdict is not JSON").set_source(json_err);

        assert!(std::error::Error::source(&err).is_some());
    }
}
