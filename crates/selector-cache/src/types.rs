use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use healkit_core_types::{RuntimeProfile, StabilityClass, StrategyId};
use page_port::{normalize_text, ContentFingerprint, Locator};
use serde::{Deserialize, Serialize};

/// `(domain, profile, element-name)`; the element name is stored normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub domain: String,
    pub profile: RuntimeProfile,
    pub element: String,
}

impl CacheKey {
    pub fn new(domain: impl Into<String>, profile: RuntimeProfile, element: &str) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            profile,
            element: normalize_text(element),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}|{}|{}", self.domain, self.profile.name(), self.element)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Fast,
    Durable,
}

impl CacheTier {
    pub fn name(&self) -> &'static str {
        match self {
            CacheTier::Fast => "fast",
            CacheTier::Durable => "durable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub locator: Locator,
    pub strategy: StrategyId,
    pub confidence: f64,
    pub stability: StabilityClass,
    pub fingerprint: ContentFingerprint,
    pub created_at: DateTime<Utc>,
    /// Last time a hit on this entry passed re-verification
    pub verified_at: DateTime<Utc>,
    /// Tier that served this copy; always `Fast` on write
    pub tier_of_origin: CacheTier,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        locator: Locator,
        strategy: StrategyId,
        confidence: f64,
        stability: StabilityClass,
        fingerprint: ContentFingerprint,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            locator,
            strategy,
            confidence,
            stability,
            fingerprint,
            created_at: now,
            verified_at: now,
            tier_of_origin: CacheTier::Fast,
        }
    }

    pub(crate) fn served_by(mut self, tier: CacheTier) -> Self {
        self.tier_of_origin = tier;
        self
    }

    /// Age measured from the last verification.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.verified_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Time-to-live per runtime profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub static_ttl: Duration,
    pub dynamic_ttl: Duration,
}

impl TtlPolicy {
    pub const fn new(static_ttl: Duration, dynamic_ttl: Duration) -> Self {
        Self {
            static_ttl,
            dynamic_ttl,
        }
    }

    pub fn for_profile(&self, profile: RuntimeProfile) -> Duration {
        match profile {
            RuntimeProfile::Static => self.static_ttl,
            RuntimeProfile::Dynamic => self.dynamic_ttl,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    RejectedVolatile,
}

/// Result of comparing a hit against the page's current region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriftCheck {
    pub drift: f64,
    pub invalidated: bool,
}
