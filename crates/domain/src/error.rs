use serde::Serialize;

/// Shared error type used across all Axon crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("stream: {0}")]
    Stream(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("sandbox: {0}")]
    Sandbox(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config: {0}")]
    Config(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a provider-scoped error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True when this error is (or wraps) a request cancellation.
    ///
    /// Cancellation must never be reclassified as a transport failure, so
    /// this check runs before any substring-based classification.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Classified failure kinds for generation errors.
///
/// Produced by the classifier in `ax-providers`; the retry policy of the
/// generation coordinator is keyed entirely off this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MaxTokens,
    Throttling,
    ZeroCandidates,
    EmptyContent,
    Connection,
    Stream,
    Internal,
    Cancelled,
    Unclassified,
}

impl ErrorKind {
    /// True when the coordinator may retry the *same* model for this kind.
    pub fn retries_same_model(self) -> bool {
        matches!(self, Self::Throttling | Self::ZeroCandidates)
    }

    /// True when the coordinator may advance to the next model in the
    /// fallback chain. Cancellation and unclassified errors terminate the
    /// request immediately.
    pub fn advances_to_fallback(self) -> bool {
        !matches!(self, Self::Cancelled | Self::Unclassified)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MaxTokens => "max_tokens",
            Self::Throttling => "throttling",
            Self::ZeroCandidates => "zero_candidates",
            Self::EmptyContent => "empty_content",
            Self::Connection => "connection",
            Self::Stream => "stream",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
            Self::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_never_retries_or_advances() {
        assert!(!ErrorKind::Cancelled.retries_same_model());
        assert!(!ErrorKind::Cancelled.advances_to_fallback());
    }

    #[test]
    fn unclassified_terminates_immediately() {
        assert!(!ErrorKind::Unclassified.retries_same_model());
        assert!(!ErrorKind::Unclassified.advances_to_fallback());
    }

    #[test]
    fn throttling_and_zero_candidates_retry_same_model() {
        assert!(ErrorKind::Throttling.retries_same_model());
        assert!(ErrorKind::ZeroCandidates.retries_same_model());
        assert!(!ErrorKind::Internal.retries_same_model());
        assert!(!ErrorKind::MaxTokens.retries_same_model());
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(ErrorKind::MaxTokens.to_string(), "max_tokens");
        assert_eq!(ErrorKind::ZeroCandidates.to_string(), "zero_candidates");
    }
}
