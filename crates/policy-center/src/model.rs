use std::collections::HashMap;
use std::time::Duration;

use healkit_core_types::RuntimeProfile;
use serde::{Deserialize, Serialize};

/// Hard ceiling on healing rounds; configuration may lower it, never raise it.
pub const MAX_HEAL_ROUNDS: u8 = 3;

/// Upper bound for `heal.timeout_growth` and `heal.tolerance_growth`.
pub const MAX_GROWTH: f64 = 10.0;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub resolution: ResolutionPolicy,
    pub gate: GatePolicy,
    pub heal: HealPolicy,
    pub cache: CachePolicy,
    pub profile: ProfilePolicy,
    pub provenance: HashMap<String, PolicyProvenance>,
}

/// A value with one setting per runtime profile.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ProfileScaled<T> {
    #[serde(rename = "static")]
    pub static_page: T,
    #[serde(rename = "dynamic")]
    pub dynamic_page: T,
}

impl<T: Copy> ProfileScaled<T> {
    pub const fn new(static_page: T, dynamic_page: T) -> Self {
        Self {
            static_page,
            dynamic_page,
        }
    }

    pub fn get(&self, profile: RuntimeProfile) -> T {
        match profile {
            RuntimeProfile::Static => self.static_page,
            RuntimeProfile::Dynamic => self.dynamic_page,
        }
    }
}

impl ProfileScaled<u64> {
    pub fn duration(&self, profile: RuntimeProfile) -> Duration {
        Duration::from_millis(self.get(profile))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ResolutionPolicy {
    /// Bound on the whole resolve → gate → heal sequence of one step
    pub step_timeout_ms: ProfileScaled<u64>,
    /// Bound on the page-idle wait before each discovery pass
    pub idle_timeout_ms: ProfileScaled<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GatePolicy {
    pub stability_samples: u32,
    pub sample_interval_ms: u64,
    pub bbox_tolerance_px: f64,
    pub verify_timeout_ms: ProfileScaled<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct HealPolicy {
    pub max_rounds: u8,
    pub learned_top_n: usize,
    pub backoff_ms: u64,
    /// Per-round widening of timeouts and sample interval
    pub timeout_growth: f64,
    /// Per-round widening of the bounding-box tolerance
    pub tolerance_growth: f64,
    pub extra_samples_per_round: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CachePolicy {
    pub fast_ttl_ms: ProfileScaled<u64>,
    pub durable_ttl_ms: ProfileScaled<u64>,
    /// Region drift above which a cached entry is invalidated
    pub drift_threshold: f64,
    pub durable_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProfilePolicy {
    #[serde(rename = "override")]
    pub override_profile: Option<RuntimeProfile>,
    pub dynamic_url_patterns: Vec<String>,
    pub framework_markers: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
    RuntimeOverride,
}

impl PolicySnapshot {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }

    pub fn source_of(&self, path: &str) -> Option<PolicySource> {
        self.provenance.get(path).map(|p| p.source)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeOverrideSpec {
    pub path: String,
    pub value: serde_json::Value,
    pub owner: String,
    pub reason: String,
    pub ttl_seconds: u64,
}
