use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use healkit_core_types::RuntimeProfile;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::PolicyError;
use crate::loader::{load_snapshot_with_options, LoadOptions};
use crate::model::{
    PolicySnapshot, PolicySource, ProfileScaled, RuntimeOverrideSpec, MAX_GROWTH,
    MAX_HEAL_ROUNDS,
};
use crate::override_store::RuntimeOverrideStore;

#[async_trait]
pub trait PolicyCenter: Send + Sync {
    async fn snapshot(&self) -> Arc<PolicySnapshot>;
    async fn reload(&self) -> Result<(), PolicyError>;
    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError>;
    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>>;
    async fn guard(&self) -> PolicyGuard;
}

struct PolicyState {
    base: PolicySnapshot,
    snapshot: PolicySnapshot,
    overrides: RuntimeOverrideStore,
    rev_counter: u64,
}

impl PolicyState {
    fn new(base: PolicySnapshot) -> Self {
        let rev_counter = base.rev;
        Self {
            base: base.clone(),
            snapshot: base,
            overrides: RuntimeOverrideStore::default(),
            rev_counter,
        }
    }

    fn apply_active_overrides(&mut self) -> Result<(), PolicyError> {
        let mut new_snapshot = self.base.clone();
        for (path, value) in self.overrides.active_entries() {
            apply_override_to_snapshot(
                &mut new_snapshot,
                &path,
                &value,
                PolicySource::RuntimeOverride,
            )?;
        }
        self.rev_counter = self.rev_counter.saturating_add(1);
        new_snapshot.rev = self.rev_counter;
        self.snapshot = new_snapshot;
        Ok(())
    }
}

pub struct InMemoryPolicyCenter {
    state: Arc<Mutex<PolicyState>>,
    watch_tx: watch::Sender<Arc<PolicySnapshot>>,
    options: Option<LoadOptions>,
}

impl InMemoryPolicyCenter {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self::with_state(PolicyState::new(snapshot), None)
    }

    /// Load through the file/env/CLI cascade; `reload` re-runs the same cascade.
    pub fn from_options(options: LoadOptions) -> Result<Self, PolicyError> {
        let snapshot = load_snapshot_with_options(&options)?;
        Ok(Self::with_state(PolicyState::new(snapshot), Some(options)))
    }

    fn with_state(state: PolicyState, options: Option<LoadOptions>) -> Self {
        let current_snapshot = Arc::new(state.snapshot.clone());
        let (watch_tx, _watch_rx) = watch::channel(current_snapshot);
        Self {
            state: Arc::new(Mutex::new(state)),
            watch_tx,
            options,
        }
    }

    fn broadcast(&self, snapshot: Arc<PolicySnapshot>) {
        // send_replace keeps the latest value even when nobody is subscribed
        self.watch_tx.send_replace(snapshot);
    }
}

#[async_trait]
impl PolicyCenter for InMemoryPolicyCenter {
    async fn snapshot(&self) -> Arc<PolicySnapshot> {
        let guard = self.state.lock().await;
        Arc::new(guard.snapshot.clone())
    }

    async fn reload(&self) -> Result<(), PolicyError> {
        let mut guard = self.state.lock().await;
        if let Some(options) = &self.options {
            guard.base = load_snapshot_with_options(options)?;
        }
        guard.apply_active_overrides()?;
        let snapshot = Arc::new(guard.snapshot.clone());
        drop(guard);
        info!(rev = snapshot.rev, "policy reloaded");
        self.broadcast(snapshot);
        Ok(())
    }

    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError> {
        let ttl = if override_spec.ttl_seconds > 0 {
            Some(Duration::from_secs(override_spec.ttl_seconds))
        } else {
            None
        };

        // validate before storing so a bad override never poisons later recomputes
        let mut probe = PolicySnapshot::default();
        apply_override_to_snapshot(
            &mut probe,
            &override_spec.path,
            &override_spec.value,
            PolicySource::RuntimeOverride,
        )?;

        let mut guard = self.state.lock().await;
        guard
            .overrides
            .insert(override_spec.path.clone(), override_spec.value.clone(), ttl);
        guard.apply_active_overrides()?;
        let snapshot = Arc::new(guard.snapshot.clone());
        drop(guard);

        info!(
            path = %override_spec.path,
            owner = %override_spec.owner,
            reason = %override_spec.reason,
            "policy override applied"
        );
        self.broadcast(snapshot);

        if let Some(ttl) = ttl {
            let state = Arc::clone(&self.state);
            let watch_tx = self.watch_tx.clone();
            let path = override_spec.path.clone();
            tokio::spawn(async move {
                sleep(ttl).await;
                let mut guard = state.lock().await;
                if guard.overrides.remove(&path) {
                    match guard.apply_active_overrides() {
                        Ok(()) => {
                            let snapshot = Arc::new(guard.snapshot.clone());
                            drop(guard);
                            if watch_tx.send(snapshot).is_err() {
                                warn!("policy override expiry broadcast had no listeners");
                            }
                        }
                        Err(err) => {
                            warn!("policy override expiry recompute failed: {err}");
                        }
                    }
                }
            });
        }

        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>> {
        self.watch_tx.subscribe()
    }

    async fn guard(&self) -> PolicyGuard {
        let snapshot = self.snapshot().await;
        PolicyGuard { snapshot }
    }
}

/// A pinned snapshot; stays stable for the lifetime of one resolution step.
#[derive(Clone, Debug)]
pub struct PolicyGuard {
    snapshot: Arc<PolicySnapshot>,
}

impl PolicyGuard {
    pub fn revision(&self) -> u64 {
        self.snapshot.rev
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.snapshot)
    }
}

pub(crate) fn apply_override_to_snapshot(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    let (head, leaf) = match path.rsplit_once('.') {
        Some((head, leaf @ ("static" | "dynamic"))) => (head, Some(leaf)),
        _ => (path, None),
    };

    match head {
        "resolution.step_timeout_ms" => {
            merge_scaled(&mut snapshot.resolution.step_timeout_ms, leaf, to_u64(value)?)
        }
        "resolution.idle_timeout_ms" => {
            merge_scaled(&mut snapshot.resolution.idle_timeout_ms, leaf, to_u64(value)?)
        }
        "gate.verify_timeout_ms" => {
            merge_scaled(&mut snapshot.gate.verify_timeout_ms, leaf, to_u64(value)?)
        }
        "cache.fast_ttl_ms" => merge_scaled(&mut snapshot.cache.fast_ttl_ms, leaf, to_u64(value)?),
        "cache.durable_ttl_ms" => {
            merge_scaled(&mut snapshot.cache.durable_ttl_ms, leaf, to_u64(value)?)
        }
        _ if leaf.is_some() => return Err(PolicyError::UnsupportedPath(path.to_string())),
        "gate.stability_samples" => {
            let samples = to_u64(value)?;
            if samples == 0 {
                return Err(PolicyError::InvalidValue(
                    "gate.stability_samples must be at least 1".into(),
                ));
            }
            snapshot.gate.stability_samples = u32::try_from(samples)
                .map_err(|_| PolicyError::InvalidValue(format!("value {samples} exceeds u32")))?;
        }
        "gate.sample_interval_ms" => snapshot.gate.sample_interval_ms = to_u64(value)?,
        "gate.bbox_tolerance_px" => snapshot.gate.bbox_tolerance_px = to_non_negative(value)?,
        "heal.max_rounds" => snapshot.heal.max_rounds = to_u8(value)?.min(MAX_HEAL_ROUNDS),
        "heal.learned_top_n" => snapshot.heal.learned_top_n = to_u64(value)? as usize,
        "heal.backoff_ms" => snapshot.heal.backoff_ms = to_u64(value)?,
        "heal.timeout_growth" => snapshot.heal.timeout_growth = to_growth(value)?,
        "heal.tolerance_growth" => snapshot.heal.tolerance_growth = to_growth(value)?,
        "heal.extra_samples_per_round" => {
            snapshot.heal.extra_samples_per_round = u32::try_from(to_u64(value)?)
                .map_err(|_| PolicyError::InvalidValue(format!("value {value} exceeds u32")))?
        }
        "cache.drift_threshold" => {
            let threshold = to_non_negative(value)?;
            if threshold > 1.0 {
                return Err(PolicyError::InvalidValue(format!(
                    "cache.drift_threshold must be within [0, 1], got {threshold}"
                )));
            }
            snapshot.cache.drift_threshold = threshold;
        }
        "cache.durable_path" => snapshot.cache.durable_path = to_opt_string(value)?,
        "profile.override" => {
            snapshot.profile.override_profile = match to_opt_string(value)? {
                Some(raw) => Some(
                    raw.parse::<RuntimeProfile>()
                        .map_err(|err| PolicyError::InvalidValue(err.to_string()))?,
                ),
                None => None,
            }
        }
        "profile.dynamic_url_patterns" => {
            snapshot.profile.dynamic_url_patterns = to_string_list(value)?
        }
        "profile.framework_markers" => snapshot.profile.framework_markers = to_string_list(value)?,
        _ => return Err(PolicyError::UnsupportedPath(path.to_string())),
    }
    record_provenance(snapshot, path, source);
    Ok(())
}

/// `leaf` picks one profile; a bare path sets both.
fn merge_scaled(target: &mut ProfileScaled<u64>, leaf: Option<&str>, candidate: u64) {
    match leaf {
        Some("static") => target.static_page = candidate,
        Some("dynamic") => target.dynamic_page = candidate,
        _ => {
            target.static_page = candidate;
            target.dynamic_page = candidate;
        }
    }
}

fn record_provenance(snapshot: &mut PolicySnapshot, path: &str, source: PolicySource) {
    snapshot.set_provenance(path, source);
}

fn to_u8(value: &Value) -> Result<u8, PolicyError> {
    to_u64(value).and_then(|v| {
        if v <= u8::MAX as u64 {
            Ok(v as u8)
        } else {
            Err(PolicyError::InvalidValue(format!("value {v} exceeds u8")))
        }
    })
}

fn to_u64(value: &Value) -> Result<u64, PolicyError> {
    value
        .as_u64()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected non-negative integer, got {value}")))
}

fn to_non_negative(value: &Value) -> Result<f64, PolicyError> {
    match value.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(PolicyError::InvalidValue(format!(
            "expected non-negative number, got {value}"
        ))),
    }
}

fn to_growth(value: &Value) -> Result<f64, PolicyError> {
    let growth = to_non_negative(value)?;
    if growth > MAX_GROWTH {
        return Err(PolicyError::InvalidValue(format!(
            "growth factor must be within [0, {MAX_GROWTH}], got {growth}"
        )));
    }
    Ok(growth)
}

fn to_opt_string(value: &Value) -> Result<Option<String>, PolicyError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(PolicyError::InvalidValue(format!(
            "expected string, got {other}"
        ))),
    }
}

fn to_string_list(value: &Value) -> Result<Vec<String>, PolicyError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    PolicyError::InvalidValue(format!("expected string item, got {item}"))
                })
            })
            .collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(PolicyError::InvalidValue(format!(
            "expected list of strings, got {other}"
        ))),
    }
}
