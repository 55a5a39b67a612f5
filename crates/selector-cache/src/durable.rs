use std::path::{Path, PathBuf};

use healkit_file_store::JsonRecordFile;
use tracing::debug;

use crate::errors::CacheError;
use crate::tier::Tier;
use crate::types::{CacheEntry, CacheKey, CacheTier, TtlPolicy};

/// JSON-file tier shared by independent runs.
///
/// Every write is a locked read-merge-write of the single record, so parallel runs and
/// separately opened tiers on one path never drop each other's entries.
pub struct JsonFileTier {
    file: JsonRecordFile<CacheEntry>,
    ttl: TtlPolicy,
}

impl JsonFileTier {
    pub fn new(path: impl Into<PathBuf>, ttl: TtlPolicy) -> Self {
        Self {
            file: JsonRecordFile::new(path),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Tier for JsonFileTier {
    fn kind(&self) -> CacheTier {
        CacheTier::Durable
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let mut entries = self.file.load()?;
        let Some(entry) = entries.remove(&key.storage_key()) else {
            return Ok(None);
        };
        if entry.age() <= self.ttl.for_profile(key.profile) {
            return Ok(Some(entry));
        }
        debug!(target: "cache", key = %key, "durable entry expired");
        let ttl = self.ttl.for_profile(key.profile);
        self.file.update(|entries| {
            // a concurrent writer may have refreshed it since the read
            let storage_key = key.storage_key();
            let expired = entries
                .get(&storage_key)
                .map_or(false, |current| current.age() > ttl);
            if expired {
                entries.remove(&storage_key);
            }
            ((), expired)
        })?;
        Ok(None)
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut record = entry.clone();
        record.tier_of_origin = CacheTier::Durable;
        self.file.update(|entries| {
            entries.insert(record.key.storage_key(), record);
            ((), true)
        })?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let removed = self.file.update(|entries| {
            let removed = entries.remove(&key.storage_key()).is_some();
            (removed, removed)
        })?;
        Ok(removed)
    }

    fn purge_domain(&self, domain: &str) -> Result<usize, CacheError> {
        let domain = domain.to_ascii_lowercase();
        let purged = self.file.update(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| entry.key.domain != domain);
            let purged = before - entries.len();
            (purged, purged > 0)
        })?;
        Ok(purged)
    }

    fn touch(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.file.update(|entries| match entries.get_mut(&key.storage_key()) {
            Some(entry) => {
                entry.verified_at = chrono::Utc::now();
                ((), true)
            }
            None => ((), false),
        })?;
        Ok(())
    }
}
