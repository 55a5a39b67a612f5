//! Error types for driver primitives

use thiserror::Error;

/// Failures raised by the underlying page driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortError {
    /// Node handle no longer attached to the document
    #[error("node {0} is detached")]
    Detached(u64),

    /// Driver-side wait exceeded its bound
    #[error("driver timeout: {0}")]
    Timeout(String),

    /// Query could not be evaluated
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Transport or protocol failure
    #[error("driver error: {0}")]
    Driver(String),
}

impl PortError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::Timeout(_) | PortError::Detached(_))
    }
}
