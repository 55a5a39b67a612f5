//! Cache telemetry.
//!
//! Counters live on the pipeline instance and are bumped on every code path that
//! serves, misses, writes or invalidates, independent of whether the caller logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    fast_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    drift_invalidations: AtomicU64,
    writes: AtomicU64,
    rejected_volatile: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn fast_hit(&self) {
        self.fast_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn durable_hit(&self) {
        self.durable_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn drift_invalidation(&self) {
        self.drift_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected_volatile(&self) {
        self.rejected_volatile.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            fast_hits: self.fast_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            drift_invalidations: self.drift_invalidations.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            rejected_volatile: self.rejected_volatile.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub fast_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub drift_invalidations: u64,
    pub writes: u64,
    pub rejected_volatile: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.fast_hits + self.durable_hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            (self.fast_hits + self.durable_hits) as f64 / lookups as f64
        }
    }
}
