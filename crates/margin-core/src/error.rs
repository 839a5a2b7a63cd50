//! Error taxonomy shared by every provider handler.
//!
//! Handlers never panic or propagate transport errors raw: every failure is
//! folded into one [`PipelineError`] whose `Display` starts with `"Error:"`,
//! so callers can pattern-match uniformly on either the variant or the text.

use thiserror::Error;

/// Classification of a pipeline failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing key or URL, detected before any network I/O.
    Config,
    /// Connection failure, timeout, or non-2xx HTTP status.
    Network,
    /// Response was undecodable or missing expected fields.
    Parse,
    /// Provider returned a well-formed error payload (auth, quota, safety block).
    Provider,
    /// Failure after a stream had started.
    Stream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Provider => "ProviderError",
            ErrorKind::Stream => "StreamError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed `query` call.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PipelineError {
    #[error("Error: {0}")]
    Config(String),

    #[error("Error: {message}")]
    Network {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    #[error("Error: {0}")]
    Parse(String),

    #[error("Error: {0}")]
    Provider(String),

    #[error("Error: {message}")]
    Stream {
        message: String,
        /// Answer text delivered before the failure.
        partial: String,
    },
}

/// Result alias used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config(message.into())
    }

    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        PipelineError::Network {
            status,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        PipelineError::Parse(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        PipelineError::Provider(message.into())
    }

    pub fn stream(message: impl Into<String>, partial: impl Into<String>) -> Self {
        PipelineError::Stream {
            message: message.into(),
            partial: partial.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Network { .. } => ErrorKind::Network,
            PipelineError::Parse(_) => ErrorKind::Parse,
            PipelineError::Provider(_) => ErrorKind::Provider,
            PipelineError::Stream { .. } => ErrorKind::Stream,
        }
    }

    /// The human-readable message, without the `"Error: "` prefix.
    pub fn message(&self) -> &str {
        match self {
            PipelineError::Config(m) | PipelineError::Parse(m) | PipelineError::Provider(m) => m,
            PipelineError::Network { message, .. } | PipelineError::Stream { message, .. } => {
                message
            }
        }
    }

    /// Replace the message text, keeping the classification and any payload.
    pub fn with_message(self, message: String) -> Self {
        match self {
            PipelineError::Config(_) => PipelineError::Config(message),
            PipelineError::Network { status, .. } => PipelineError::Network { status, message },
            PipelineError::Parse(_) => PipelineError::Parse(message),
            PipelineError::Provider(_) => PipelineError::Provider(message),
            PipelineError::Stream { partial, .. } => PipelineError::Stream { message, partial },
        }
    }

    /// HTTP status carried by a network error.
    pub fn status(&self) -> Option<u16> {
        match self {
            PipelineError::Network { status, .. } => *status,
            _ => None,
        }
    }

    /// Text streamed before a stream failure (empty when nothing arrived).
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            PipelineError::Stream { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_prefixed() {
        let err = PipelineError::config("Missing API key for Groq");
        assert_eq!(err.to_string(), "Error: Missing API key for Groq");

        let err = PipelineError::network(Some(429), "Groq returned HTTP 429: slow down");
        assert!(err.to_string().starts_with("Error:"));
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_with_message_keeps_kind() {
        let err = PipelineError::network(Some(401), "unauthorized");
        let enhanced = err.with_message("unauthorized (check region)".to_string());

        assert_eq!(enhanced.kind(), ErrorKind::Network);
        assert_eq!(enhanced.status(), Some(401));
        assert_eq!(enhanced.message(), "unauthorized (check region)");
    }

    #[test]
    fn test_stream_error_keeps_partial() {
        let err = PipelineError::stream("connection reset", "The answer is");
        let err = err.with_message("connection reset by peer".to_string());

        assert_eq!(err.kind(), ErrorKind::Stream);
        assert_eq!(err.partial_text(), Some("The answer is"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::Parse.to_string(), "ParseError");
        assert_eq!(PipelineError::provider("quota").kind().as_str(), "ProviderError");
    }
}
