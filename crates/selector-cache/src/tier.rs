use crate::errors::CacheError;
use crate::types::{CacheEntry, CacheKey, CacheTier};

/// One storage tier of the selector cache.
///
/// Writes are idempotent upserts keyed by [`CacheKey`]; concurrent writers resolve
/// last-writer-wins.
pub trait Tier: Send + Sync {
    fn kind(&self) -> CacheTier;

    /// Live entry for `key`; expired entries are dropped and reported as absent.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Drop every entry for `domain`, returning how many went.
    fn purge_domain(&self, domain: &str) -> Result<usize, CacheError>;

    /// Mark a hit as re-verified, restarting its TTL.
    fn touch(&self, key: &CacheKey) -> Result<(), CacheError> {
        if let Some(mut entry) = self.get(key)? {
            entry.verified_at = chrono::Utc::now();
            self.put(&entry)?;
        }
        Ok(())
    }
}
