//! Allocation error types.

use thiserror::Error;

/// Errors that can occur while allocating a grid.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before touching pools or provisioning.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provisioning collaborator could not create a resource.
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] anyhow::Error),
}

impl EngineError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Provisioning(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
