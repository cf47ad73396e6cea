//! Error types for the coordination core.
//!
//! This module defines all error types used throughout the crate, following
//! the same hand-rolled, constructor-function convention the rest of the
//! crate's ambient code uses rather than deriving with `thiserror`.

use std::fmt;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for coordination operations.
#[derive(Debug)]
pub enum Error {
    /// Backend call failed in a way that is worth retrying (timeout, rate
    /// limit, transient network failure).
    TransientBackend {
        /// Name of the backend that failed.
        backend: String,
        /// The underlying error message.
        message: String,
    },

    /// Backend call failed in a way that will not succeed on retry
    /// (authentication, malformed request, unsupported capability).
    PermanentBackend {
        /// Name of the backend that failed.
        backend: String,
        /// The underlying error message.
        message: String,
    },

    /// Error during external tool execution.
    Tool {
        /// Name of the tool that failed.
        tool_name: String,
        /// The underlying error message.
        message: String,
    },

    /// A coordination tool call (`new_answer`/`vote`) did not match the
    /// expected schema or referenced an unknown target.
    InvalidCoordinationCall {
        /// Name of the coordination tool invoked.
        tool_name: String,
        /// Why the call was rejected.
        message: String,
    },

    /// A tool call was rejected by planning-mode policy.
    PolicyViolation {
        /// Name of the tool that was rejected.
        tool_name: String,
        /// Why the call was rejected.
        message: String,
    },

    /// An operation was attempted on a session that has already closed.
    SessionClosed,

    /// The session exceeded its configured wall-clock timeout.
    SessionTimeout {
        /// Timeout that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// Execution was cancelled, either by the user or by a restart signal.
    Cancelled,

    /// Workspace filesystem operation failed.
    Workspace {
        /// Agent whose workspace the operation concerned.
        agent_name: String,
        /// The underlying error message.
        message: String,
    },

    /// An operation is not supported by the current backend/configuration.
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// Invalid configuration.
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// JSON serialization/deserialization error.
    Json {
        /// The underlying error message.
        message: String,
    },

    /// Filesystem I/O error.
    Io {
        /// The underlying error message.
        message: String,
    },

    /// An invariant was violated that should be unreachable in correct
    /// operation; indicates a bug rather than an environmental failure.
    Fatal {
        /// Description of the violated invariant.
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientBackend { backend, message } => {
                write!(f, "transient backend error ({backend}): {message}")
            }
            Self::PermanentBackend { backend, message } => {
                write!(f, "permanent backend error ({backend}): {message}")
            }
            Self::Tool { tool_name, message } => {
                write!(f, "tool execution error in '{tool_name}': {message}")
            }
            Self::InvalidCoordinationCall { tool_name, message } => {
                write!(f, "invalid coordination call '{tool_name}': {message}")
            }
            Self::PolicyViolation { tool_name, message } => {
                write!(f, "policy violation for tool '{tool_name}': {message}")
            }
            Self::SessionClosed => write!(f, "session is already closed"),
            Self::SessionTimeout { timeout_secs } => {
                write!(f, "session exceeded its {timeout_secs}s timeout")
            }
            Self::Cancelled => write!(f, "operation was cancelled"),
            Self::Workspace { agent_name, message } => {
                write!(f, "workspace error for agent '{agent_name}': {message}")
            }
            Self::Unsupported { message } => write!(f, "unsupported: {message}"),
            Self::Configuration { message } => write!(f, "configuration error: {message}"),
            Self::Json { message } => write!(f, "json error: {message}"),
            Self::Io { message } => write!(f, "io error: {message}"),
            Self::Fatal { message } => write!(f, "fatal error: {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientBackend {
            backend: err
                .url()
                .and_then(|u| u.host_str().map(str::to_owned))
                .unwrap_or_else(|| "unknown".to_owned()),
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Create a new transient backend error.
    #[must_use]
    pub fn transient_backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a new permanent backend error.
    #[must_use]
    pub fn permanent_backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermanentBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a new tool execution error.
    #[must_use]
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid coordination call error.
    #[must_use]
    pub fn invalid_coordination_call(
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidCoordinationCall {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a new policy violation error.
    #[must_use]
    pub fn policy_violation(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a new session timeout error.
    #[must_use]
    pub const fn session_timeout(timeout_secs: u64) -> Self {
        Self::SessionTimeout { timeout_secs }
    }

    /// Create a new workspace error.
    #[must_use]
    pub fn workspace(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Workspace {
            agent_name: agent_name.into(),
            message: message.into(),
        }
    }

    /// Create a new unsupported-operation error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new fatal/invariant-violation error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same call might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientBackend { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transient_backend_is_retryable() {
        let err = Error::transient_backend("openai", "rate limited");
        assert!(err.is_retryable());
    }

    #[test]
    fn permanent_backend_is_not_retryable() {
        let err = Error::permanent_backend("openai", "invalid api key");
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::tool("web_search", "timed out");
        let rendered = err.to_string();
        assert!(rendered.contains("web_search"));
        assert!(rendered.contains("timed out"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json { .. }));
    }

    #[test]
    fn session_timeout_carries_seconds() {
        let err = Error::session_timeout(600);
        assert!(matches!(err, Error::SessionTimeout { timeout_secs: 600 }));
    }
}
