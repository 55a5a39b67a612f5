//! Error types for the locator system

use action_gate::GateError;
use healkit_file_store::StoreError;
use page_port::PortError;
use thiserror::Error;

/// Locator error enumeration
///
/// Strategy non-matches and gate rejections are outcomes, not errors; these variants
/// cover terminal conditions and infrastructure faults.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// A scope was requested but no matching container is open
    #[error("scope not found: {0}")]
    ScopeNotFound(String),

    /// Driver fault
    #[error("port error: {0}")]
    Port(#[from] PortError),

    /// Gate could not run its checks
    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    /// Strategy history could not be read or written
    #[error("history store error: {0}")]
    History(String),

    /// Invalid classifier pattern
    #[error("invalid profile pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Malformed intent
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Port(err) => err.is_retryable(),
            LocatorError::Gate(err) => err.is_retryable(),
            LocatorError::History(_) => true,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::InvalidPattern { .. } | LocatorError::InvalidIntent(_) => 3,
            LocatorError::Port(_) | LocatorError::Gate(_) => 2,
            LocatorError::ScopeNotFound(_) => 1,
            LocatorError::History(_) => 0,
        }
    }
}

impl From<StoreError> for LocatorError {
    fn from(err: StoreError) -> Self {
        LocatorError::History(err.to_string())
    }
}
