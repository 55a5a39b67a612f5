//! Error types for the actionability gate

use page_port::PortError;
use thiserror::Error;

/// Gate error enumeration
///
/// Check failures are reported in [`crate::ActionabilityReport`]; these errors cover
/// faults that prevented the checks from running at all.
#[derive(Debug, Error, Clone)]
pub enum GateError {
    /// Driver fault while evaluating a check
    #[error("port error during {check}: {source}")]
    Port {
        check: &'static str,
        #[source]
        source: PortError,
    },

    /// Options that cannot produce a meaningful verdict
    #[error("invalid gate options: {0}")]
    InvalidOptions(String),
}

impl GateError {
    pub(crate) fn port(check: &'static str, source: PortError) -> Self {
        GateError::Port { check, source }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            GateError::Port { source, .. } => source.is_retryable(),
            GateError::InvalidOptions(_) => false,
        }
    }
}
