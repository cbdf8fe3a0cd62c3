//! Poll failures.

use std::time::Duration;

use thiserror::Error;

pub type PollResult<T> = Result<T, PollError>;

/// A remote grid endpoint could not give a usable answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("request to {uri} failed: {reason}")]
    Connect { uri: String, reason: String },

    #[error("request to {uri} timed out after {after:?}")]
    Timeout { uri: String, after: Duration },

    #[error("{uri} answered HTTP {status}")]
    Status { uri: String, status: u16 },

    #[error("malformed payload from {uri}: {reason}")]
    Malformed { uri: String, reason: String },
}

impl PollError {
    pub fn uri(&self) -> &str {
        match self {
            PollError::Connect { uri, .. }
            | PollError::Timeout { uri, .. }
            | PollError::Status { uri, .. }
            | PollError::Malformed { uri, .. } => uri,
        }
    }
}
