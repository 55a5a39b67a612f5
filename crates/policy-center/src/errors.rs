use thiserror::Error;

/// Policy load and override failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy file exists but could not be read
    #[error("cannot read policy: {0}")]
    Io(String),

    /// File or env payload that does not parse
    #[error("malformed policy document: {0}")]
    Invalid(String),

    #[error("no such policy setting: {0}")]
    UnsupportedPath(String),

    #[error("rejected policy value: {0}")]
    InvalidValue(String),
}

impl PolicyError {
    /// Only IO faults are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PolicyError::Io(_))
    }
}
