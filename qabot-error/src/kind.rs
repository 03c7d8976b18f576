//! Error kinds for qabot operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to report a failure; the CLI
/// maps a few of them to distinct exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid or missing configuration (e.g. no API credential)
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Requirement errors
    // =========================================================================
    /// The requirement text has no usable action phrase
    ParseFailed,

    // =========================================================================
    // Tool dispatch errors
    // =========================================================================
    /// A tool call was refused (unknown, out of order, repeated, bad args)
    ToolRejected,

    /// The reasoning loop hit its iteration cap
    StepLimitExceeded,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available (5xx, overloaded)
    ProviderUnavailable,

    /// Rate limit or quota exceeded
    RateLimited,

    /// The provider rejected the credential
    AuthenticationFailed,

    /// The provider response could not be decoded
    SerializationFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Requirement
            ErrorKind::ParseFailed => "ParseFailed",

            // Tools
            ErrorKind::ToolRejected => "ToolRejected",
            ErrorKind::StepLimitExceeded => "StepLimitExceeded",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
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
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
