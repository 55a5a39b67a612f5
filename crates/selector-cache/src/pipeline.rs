use std::sync::Arc;

use chrono::Utc;
use healkit_core_types::StabilityClass;
use page_port::ContentFingerprint;
use tracing::{debug, info, warn};

use crate::errors::CacheError;
use crate::memory::MemoryTier;
use crate::metrics::{CacheCounters, CacheStats};
use crate::tier::Tier;
use crate::types::{CacheEntry, CacheKey, CacheTier, DriftCheck, PutOutcome, TtlPolicy};

/// Fast tier in front of a durable tier, with warm-back and drift invalidation.
pub struct CachePipeline {
    fast: Arc<dyn Tier>,
    durable: Arc<dyn Tier>,
    drift_threshold: f64,
    counters: CacheCounters,
}

impl CachePipeline {
    pub fn new(fast: Arc<dyn Tier>, durable: Arc<dyn Tier>, drift_threshold: f64) -> Self {
        Self {
            fast,
            durable,
            drift_threshold,
            counters: CacheCounters::default(),
        }
    }

    /// Both tiers in memory; nothing survives the process.
    pub fn in_memory(fast_ttl: TtlPolicy, durable_ttl: TtlPolicy, drift_threshold: f64) -> Self {
        Self::new(
            Arc::new(MemoryTier::new(CacheTier::Fast, fast_ttl)),
            Arc::new(MemoryTier::new(CacheTier::Durable, durable_ttl)),
            drift_threshold,
        )
    }

    pub fn drift_threshold(&self) -> f64 {
        self.drift_threshold
    }

    /// Fast tier, then durable with warm-back. Tier faults degrade to a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.fast.get(key) {
            Ok(Some(entry)) => {
                self.counters.fast_hit();
                debug!(target: "cache", key = %key, "fast tier hit");
                return Some(entry.served_by(CacheTier::Fast));
            }
            Ok(None) => {}
            Err(err) => warn!(target: "cache", key = %key, error = %err, "fast tier read failed"),
        }

        match self.durable.get(key) {
            Ok(Some(entry)) => {
                self.counters.durable_hit();
                // the fast TTL runs from warm-back, not from the durable verification
                let mut warm = entry.clone();
                warm.verified_at = Utc::now();
                if let Err(err) = self.fast.put(&warm) {
                    warn!(target: "cache", key = %key, error = %err, "warm-back failed");
                }
                debug!(target: "cache", key = %key, "durable tier hit, warmed back");
                return Some(entry.served_by(CacheTier::Durable));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target: "cache", key = %key, error = %err, "durable tier read failed")
            }
        }

        self.counters.miss();
        debug!(target: "cache", key = %key, "miss");
        None
    }

    /// Writes both tiers; volatile entries are refused.
    pub fn put(&self, entry: &CacheEntry) -> Result<PutOutcome, CacheError> {
        if entry.stability != StabilityClass::Stable {
            self.counters.rejected_volatile();
            debug!(target: "cache", key = %entry.key, strategy = entry.strategy.name(), "refusing volatile entry");
            return Ok(PutOutcome::RejectedVolatile);
        }
        let mut record = entry.clone();
        record.tier_of_origin = CacheTier::Fast;
        self.fast.put(&record)?;
        self.durable.put(&record)?;
        self.counters.write();
        info!(
            target: "cache",
            key = %entry.key,
            locator = %entry.locator,
            strategy = entry.strategy.name(),
            "entry stored"
        );
        Ok(PutOutcome::Stored)
    }

    /// Compare a hit against the current region; `None` means the locator no longer
    /// resolves and counts as full drift.
    pub fn check_drift(
        &self,
        entry: &CacheEntry,
        current: Option<&ContentFingerprint>,
    ) -> Result<DriftCheck, CacheError> {
        let drift = current
            .map(|fingerprint| entry.fingerprint.drift(fingerprint))
            .unwrap_or(1.0);
        if drift <= self.drift_threshold {
            return Ok(DriftCheck {
                drift,
                invalidated: false,
            });
        }
        self.counters.drift_invalidation();
        self.remove_everywhere(&entry.key)?;
        info!(
            target: "cache",
            key = %entry.key,
            drift,
            threshold = self.drift_threshold,
            "entry invalidated by drift"
        );
        Ok(DriftCheck {
            drift,
            invalidated: true,
        })
    }

    /// Restart the TTL of a hit that passed re-verification.
    pub fn refresh(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.fast.touch(key)?;
        self.durable.touch(key)
    }

    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let removed = self.remove_everywhere(key)?;
        if removed {
            debug!(target: "cache", key = %key, "entry invalidated");
        }
        Ok(removed)
    }

    pub fn purge_domain(&self, domain: &str) -> Result<usize, CacheError> {
        let fast = self.fast.purge_domain(domain)?;
        let durable = self.durable.purge_domain(domain)?;
        info!(target: "cache", domain, fast, durable, "domain purged");
        Ok(fast.max(durable))
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn remove_everywhere(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let fast = self.fast.remove(key)?;
        let durable = self.durable.remove(key)?;
        Ok(fast || durable)
    }
}
