//! Engine settings derived from a policy snapshot
//!
//! Every profile-dependent knob (timeouts, TTLs) is resolved here so the engine only
//! ever asks "what is X for this profile".

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_gate::{GateOptions, Widening};
use action_locator::{HealParams, LocatorError, ProfileClassifier};
use anyhow::Context;
use healkit_core_types::RuntimeProfile;
use healkit_policy_center::{
    default_snapshot, load_snapshot, CachePolicy, GatePolicy, HealPolicy, PolicyCenter,
    PolicySnapshot, ProfilePolicy, ProfileScaled, MAX_HEAL_ROUNDS,
};
use selector_cache::{CachePipeline, CacheTier, JsonFileTier, MemoryTier, TtlPolicy};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub step_timeout_ms: ProfileScaled<u64>,
    pub idle_timeout_ms: ProfileScaled<u64>,
    pub gate: GatePolicy,
    pub heal: HealPolicy,
    pub cache: CachePolicy,
    pub profile: ProfilePolicy,
}

impl EngineSettings {
    pub fn from_snapshot(snapshot: &PolicySnapshot) -> Self {
        Self {
            step_timeout_ms: snapshot.resolution.step_timeout_ms,
            idle_timeout_ms: snapshot.resolution.idle_timeout_ms,
            gate: snapshot.gate.clone(),
            heal: snapshot.heal.clone(),
            cache: snapshot.cache.clone(),
            profile: snapshot.profile.clone(),
        }
    }

    /// Settings pinned from the center's current revision.
    pub async fn from_policy_center(center: &dyn PolicyCenter) -> Self {
        let guard = center.guard().await;
        Self::from_snapshot(&guard.snapshot())
    }

    pub fn step_timeout(&self, profile: RuntimeProfile) -> Duration {
        self.step_timeout_ms.duration(profile)
    }

    pub fn idle_timeout(&self, profile: RuntimeProfile) -> Duration {
        self.idle_timeout_ms.duration(profile)
    }

    /// Round-0 gate options.
    pub fn gate_options(&self, profile: RuntimeProfile) -> GateOptions {
        GateOptions::new(
            self.gate.stability_samples.max(1),
            Duration::from_millis(self.gate.sample_interval_ms),
            self.gate.bbox_tolerance_px,
            self.gate.verify_timeout_ms.duration(profile),
        )
    }

    pub fn widening(&self) -> Widening {
        Widening {
            timeout_growth: self.heal.timeout_growth,
            tolerance_growth: self.heal.tolerance_growth,
            extra_samples_per_round: self.heal.extra_samples_per_round,
        }
    }

    pub fn heal_params(&self, profile: RuntimeProfile) -> HealParams {
        HealParams {
            max_rounds: self.heal.max_rounds.min(MAX_HEAL_ROUNDS),
            learned_top_n: self.heal.learned_top_n,
            backoff: Duration::from_millis(self.heal.backoff_ms),
            widening: self.widening(),
            base_gate: self.gate_options(profile),
            idle_timeout: self.idle_timeout(profile),
        }
    }

    pub fn fast_ttl(&self) -> TtlPolicy {
        ttl(&self.cache.fast_ttl_ms)
    }

    pub fn durable_ttl(&self) -> TtlPolicy {
        ttl(&self.cache.durable_ttl_ms)
    }

    pub fn classifier(&self) -> Result<ProfileClassifier, LocatorError> {
        ProfileClassifier::new(
            &self.profile.dynamic_url_patterns,
            &self.profile.framework_markers,
            self.profile.override_profile,
        )
    }

    /// Memory fast tier; durable tier on disk when `cache.durable_path` is set.
    pub fn build_cache(&self) -> CachePipeline {
        let fast = Arc::new(MemoryTier::new(CacheTier::Fast, self.fast_ttl()));
        match &self.cache.durable_path {
            Some(path) => CachePipeline::new(
                fast,
                Arc::new(JsonFileTier::new(path, self.durable_ttl())),
                self.cache.drift_threshold,
            ),
            None => CachePipeline::new(
                fast,
                Arc::new(MemoryTier::new(CacheTier::Durable, self.durable_ttl())),
                self.cache.drift_threshold,
            ),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_snapshot(&default_snapshot())
    }
}

fn ttl(scaled: &ProfileScaled<u64>) -> TtlPolicy {
    TtlPolicy::new(
        scaled.duration(RuntimeProfile::Static),
        scaled.duration(RuntimeProfile::Dynamic),
    )
}

/// Builtin defaults, then `path` (if any), then `HEALKIT_POLICY__*` env overlays.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<EngineSettings> {
    let snapshot = load_snapshot(path).with_context(|| match path {
        Some(p) => format!("failed to load policy from {}", p.display()),
        None => "failed to load policy".to_string(),
    })?;
    Ok(EngineSettings::from_snapshot(&snapshot))
}
