use crate::notification::TerminalResult;

/// Message used when the response body cannot be opened.
pub const EMPTY_BODY_MESSAGE: &str = "Stream response body is empty";
/// Message used when the stream ends without a terminal result.
pub const NO_RESULT_MESSAGE: &str = "Stream completed without a final result";
/// Message used when the caller cancels a running session.
pub const ABORTED_MESSAGE: &str = "Audit stream aborted";

/// Terminal failure classification for a session.
///
/// Every variant ends the session in the `Failed` state. Cancellation is not a
/// failure and is reported as `Outcome::Aborted` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamFailure {
    /// The response status was not a success status.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The response preamble did not describe an event stream.
    #[error("{message}")]
    Protocol { message: String },
    /// The server sent an `error` frame.
    #[error("{message}")]
    Stream { message: String },
    /// Reading the next chunk from the byte source failed.
    #[error("{message}")]
    Transport { message: String },
    /// The stream ended without ever carrying a terminal result.
    #[error("Stream completed without a final result")]
    NoResult,
}

impl StreamFailure {
    /// Creates an HTTP failure with the standard message for `status`.
    pub fn http(status: u16) -> Self {
        Self::Http {
            status,
            message: format!("Stream request failed ({status})"),
        }
    }

    /// Creates a protocol failure.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a failure carried by an `error` frame.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this failure.
    pub fn message(&self) -> &str {
        match self {
            Self::Http { message, .. }
            | Self::Protocol { message }
            | Self::Stream { message }
            | Self::Transport { message } => message,
            Self::NoResult => NO_RESULT_MESSAGE,
        }
    }
}

/// Error raised by a `ByteSource` while reading the next chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self::new(value.to_string())
    }
}

/// Terminal outcome of one session. Exactly one is produced per session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The stream ended naturally after at least one terminal result.
    Completed(TerminalResult),
    /// The session failed; no result is delivered.
    Failed(StreamFailure),
    /// The caller cancelled the session.
    Aborted,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Converts the outcome into the caller-facing result type.
    pub fn into_result(self) -> Result<TerminalResult, AuditError> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed(failure) => Err(AuditError::Failed(failure)),
            Self::Aborted => Err(AuditError::Aborted),
        }
    }
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The session ended in the `Failed` state.
    #[error(transparent)]
    Failed(StreamFailure),
    /// The session was cancelled by the caller.
    #[error("Audit stream aborted")]
    Aborted,
    /// Internal misuse or invariant violation in the hosting task.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AuditError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the failure classification when the session failed.
    pub fn failure(&self) -> Option<&StreamFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<StreamFailure> for AuditError {
    fn from(value: StreamFailure) -> Self {
        AuditError::Failed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_failure_carries_status_in_message() {
        let failure = StreamFailure::http(503);
        assert_eq!(failure.message(), "Stream request failed (503)");
        assert_eq!(failure.to_string(), "Stream request failed (503)");
    }

    #[test]
    fn aborted_is_distinct_from_failed() {
        let err = Outcome::Aborted.into_result().expect_err("aborted");
        assert!(matches!(err, AuditError::Aborted));
        assert!(err.failure().is_none());
        assert_eq!(err.to_string(), ABORTED_MESSAGE);
    }

    #[test]
    fn failure_serializes_with_kind_tag() {
        let value = serde_json::to_value(StreamFailure::stream("boom")).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"kind": "stream", "message": "boom"})
        );
    }
}
