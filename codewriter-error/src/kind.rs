//! Error kinds for codewriter operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react; the CLI only prints
/// it, library users may want to distinguish e.g. `RateLimited` from
/// `AttemptsExhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration (missing API key, zero attempt cap, ...)
    ConfigInvalid,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// The model call failed or returned an error response
    InferenceFailed,

    /// Provider not reachable or returned a server error
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// API key rejected
    AuthenticationFailed,

    /// Transport-level failure talking to the provider
    NetworkFailed,

    /// The model answered without any content
    EmptyResponse,

    // =========================================================================
    // Review errors
    // =========================================================================
    /// The review crew could not produce a verdict
    ReviewFailed,

    /// The review loop hit its attempt cap without a pass
    AttemptsExhausted,

    // =========================================================================
    // Script execution errors
    // =========================================================================
    /// A script exceeded its wall-clock limit
    ScriptTimeout,

    /// A script could not be started
    ScriptFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::EmptyResponse => "EmptyResponse",

            ErrorKind::ReviewFailed => "ReviewFailed",
            ErrorKind::AttemptsExhausted => "AttemptsExhausted",

            ErrorKind::ScriptTimeout => "ScriptTimeout",
            ErrorKind::ScriptFailed => "ScriptFailed",

            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
                | ErrorKind::ScriptTimeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::AttemptsExhausted.to_string(), "AttemptsExhausted");
        assert_eq!(ErrorKind::InferenceFailed.to_string(), "InferenceFailed");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::AuthenticationFailed.is_retryable());
        assert!(!ErrorKind::AttemptsExhausted.is_retryable());
    }
}
