use healkit_file_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("durable tier: {0}")]
    Store(#[from] StoreError),
}

impl CacheError {
    /// Io faults may clear up on a later write; a corrupt store will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Store(err) => err.is_retryable(),
        }
    }
}
