use dashmap::DashMap;

use crate::errors::CacheError;
use crate::tier::Tier;
use crate::types::{CacheEntry, CacheKey, CacheTier, TtlPolicy};

/// Process-local tier backed by a concurrent map.
///
/// Used as the fast tier, and as the durable tier when no durable path is configured.
pub struct MemoryTier {
    kind: CacheTier,
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: TtlPolicy,
}

impl MemoryTier {
    pub fn new(kind: CacheTier, ttl: TtlPolicy) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Tier for MemoryTier {
    fn kind(&self) -> CacheTier {
        self.kind
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let ttl = self.ttl.for_profile(key.profile);
        if let Some(entry) = self.entries.get(key) {
            if entry.age() <= ttl {
                return Ok(Some(entry.clone()));
            }
        }
        self.entries.remove(key);
        Ok(None)
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn purge_domain(&self, domain: &str) -> Result<usize, CacheError> {
        let domain = domain.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|key, _| key.domain != domain);
        Ok(before - self.entries.len())
    }

    fn touch(&self, key: &CacheKey) -> Result<(), CacheError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.verified_at = chrono::Utc::now();
        }
        Ok(())
    }
}
