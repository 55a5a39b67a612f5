use crate::model::{
    CachePolicy, GatePolicy, HealPolicy, PolicySnapshot, ProfilePolicy, ProfileScaled,
    ResolutionPolicy, MAX_HEAL_ROUNDS,
};

const HOUR_MS: u64 = 60 * 60 * 1000;

pub fn default_snapshot() -> PolicySnapshot {
    PolicySnapshot {
        rev: 1,
        resolution: ResolutionPolicy {
            step_timeout_ms: ProfileScaled::new(15_000, 30_000),
            idle_timeout_ms: ProfileScaled::new(2_000, 5_000),
        },
        gate: GatePolicy {
            stability_samples: 3,
            sample_interval_ms: 50,
            bbox_tolerance_px: 2.0,
            verify_timeout_ms: ProfileScaled::new(1_500, 3_000),
        },
        heal: HealPolicy {
            max_rounds: MAX_HEAL_ROUNDS,
            learned_top_n: 2,
            backoff_ms: 100,
            timeout_growth: 0.5,
            tolerance_growth: 0.5,
            extra_samples_per_round: 1,
        },
        cache: CachePolicy {
            fast_ttl_ms: ProfileScaled::new(10 * 60 * 1000, 60 * 1000),
            durable_ttl_ms: ProfileScaled::new(7 * 24 * HOUR_MS, 24 * HOUR_MS),
            drift_threshold: 0.25,
            durable_path: None,
        },
        profile: ProfilePolicy {
            override_profile: None,
            dynamic_url_patterns: vec![
                r"#!?/".to_string(),
                r"/app(/|$)".to_string(),
                r"/dashboard(/|$)".to_string(),
                r"[?&]spa=".to_string(),
            ],
            framework_markers: vec![
                "data-reactroot".to_string(),
                "__NEXT_DATA__".to_string(),
                "ng-version".to_string(),
                "__NUXT__".to_string(),
                "data-v-app".to_string(),
                "data-svelte-h".to_string(),
                "__remixContext".to_string(),
            ],
        },
        provenance: Default::default(),
    }
}
