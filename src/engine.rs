//! Resolution orchestration
//!
//! Per intent: scope → cache lookup (drift check, gate, refresh) → discovery → gate →
//! healing → promote to cache → [`Resolution`]. The whole sequence runs under the
//! profile's step timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_gate::{
    ActionabilityGate, ActionabilityReport, DefaultActionabilityGate, FailingReason, GateTarget,
};
use action_locator::{
    AttemptOutcome, ClassificationReason, DiscoveryEngine, HealOutcome, HealTrigger,
    HealingEngine, HistoryStore, InMemoryHistory, LocatorError, ProbeResult, ProfileClassifier,
    ScopeHandle, ScopeResolver,
};
use async_trait::async_trait;
use healkit_core_types::{
    Intent, ResolutionSource, RuntimeProfile, StabilityClass, StepId, StrategyId,
};
use healkit_event_bus::{EngineEvent, EventBus, EventEmitter, Subsystem};
use healkit_policy_center::PolicyCenter;
use page_port::{resolve_locator, Locator, NodeRef, PagePort, PortError};
use parking_lot::{Mutex, RwLock};
use selector_cache::{CacheEntry, CacheKey, CachePipeline, CacheTier, PutOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineSettings;
use crate::errors::{ActionFailure, FailureReason, ResolutionError, ResolutionFailure};

/// Classification of the current page, fixed until the next navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub domain: String,
    pub profile: RuntimeProfile,
    pub reason: ClassificationReason,
}

/// A verified, actionable target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub step_id: StepId,
    pub target: NodeRef,
    pub locator: Locator,
    pub strategy: StrategyId,
    pub confidence: f64,
    pub stability: StabilityClass,
    pub source: ResolutionSource,
    /// Healing rounds it took; 0 unless `source` is `Healed`
    pub rounds: u8,
    pub elapsed: Duration,
}

/// Performs the action itself once a target is verified.
#[async_trait]
pub trait ActionPerformer: Send + Sync {
    async fn perform(&self, intent: &Intent, target: &Resolution) -> Result<(), ActionFailure>;
}

/// Progress of one step, readable after the step future is cancelled.
#[derive(Debug, Default)]
struct StepTrace {
    strategies: Vec<StrategyId>,
    rounds: u8,
    last_failing_reason: Option<FailingReason>,
}

impl StepTrace {
    fn failure(&self, reason: FailureReason) -> ResolutionFailure {
        ResolutionFailure {
            reason,
            rounds_attempted: self.rounds,
            strategies_tried: self.strategies.clone(),
            last_failing_reason: self.last_failing_reason,
            detail: None,
        }
    }
}

struct Step<'a> {
    id: StepId,
    settings: EngineSettings,
    intent: &'a Intent,
    context: &'a PageContext,
    key: CacheKey,
    trace: &'a Mutex<StepTrace>,
}

pub struct EngineBuilder {
    port: Arc<dyn PagePort>,
    settings: EngineSettings,
    cache: Option<Arc<CachePipeline>>,
    history: Option<Arc<dyn HistoryStore>>,
    gate: Option<Arc<dyn ActionabilityGate>>,
    policy: Option<Arc<dyn PolicyCenter>>,
    emitter: EventEmitter,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(mut self, cache: Arc<CachePipeline>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn gate(mut self, gate: Arc<dyn ActionabilityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Re-read timing and healing policy from `center` at the start of every step.
    pub fn policy_center(mut self, center: Arc<dyn PolicyCenter>) -> Self {
        self.policy = Some(center);
        self
    }

    pub fn event_bus(mut self, bus: Arc<dyn EventBus<EngineEvent>>) -> Self {
        self.emitter = EventEmitter::new(bus);
        self
    }

    pub fn build(self) -> Result<ResolutionEngine, ResolutionError> {
        let classifier = self
            .settings
            .classifier()
            .map_err(|err| ResolutionError::Config(err.to_string()))?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(self.settings.build_cache()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));
        let gate = self
            .gate
            .unwrap_or_else(|| Arc::new(DefaultActionabilityGate::new(self.port.clone())));
        Ok(ResolutionEngine {
            scopes: ScopeResolver::new(self.port.clone()),
            discovery: Arc::new(DiscoveryEngine::new(self.port.clone())),
            port: self.port,
            settings: self.settings,
            classifier,
            gate,
            history,
            cache,
            policy: self.policy,
            emitter: self.emitter,
            context: RwLock::new(None),
        })
    }
}

/// Resolves intents to verified targets on one page.
pub struct ResolutionEngine {
    port: Arc<dyn PagePort>,
    settings: EngineSettings,
    classifier: ProfileClassifier,
    scopes: ScopeResolver,
    discovery: Arc<DiscoveryEngine>,
    gate: Arc<dyn ActionabilityGate>,
    history: Arc<dyn HistoryStore>,
    cache: Arc<CachePipeline>,
    policy: Option<Arc<dyn PolicyCenter>>,
    emitter: EventEmitter,
    context: RwLock<Option<PageContext>>,
}

impl ResolutionEngine {
    pub fn builder(port: Arc<dyn PagePort>) -> EngineBuilder {
        EngineBuilder {
            port,
            settings: EngineSettings::default(),
            cache: None,
            history: None,
            gate: None,
            policy: None,
            emitter: EventEmitter::silent(),
        }
    }

    pub fn cache(&self) -> &Arc<CachePipeline> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Discovery passes run so far, across all steps.
    pub fn discovery_passes(&self) -> u64 {
        self.discovery.passes()
    }

    pub fn page_context(&self) -> Option<PageContext> {
        self.context.read().clone()
    }

    /// Classify the newly loaded page once; later steps reuse the result.
    pub async fn on_navigation(&self, url: &str) -> Result<PageContext, ResolutionError> {
        let domain = domain_of(url)?;
        let signals = self.port.page_signals().await?;
        let classification = self.classifier.classify(url, &signals);
        let context = PageContext {
            url: url.to_string(),
            domain,
            profile: classification.profile,
            reason: classification.reason,
        };
        self.emitter
            .emit(
                EngineEvent::new(Subsystem::Profile, "profile.classified").detail(json!({
                    "url": context.url,
                    "domain": context.domain,
                    "profile": context.profile.name(),
                    "reason": context.reason,
                })),
            )
            .await;
        *self.context.write() = Some(context.clone());
        Ok(context)
    }

    /// Resolve `intent` to a verified target, healing if needed.
    pub async fn resolve(&self, intent: &Intent) -> Result<Resolution, ResolutionError> {
        let context = self.current_context(intent)?;
        let trace = Mutex::new(StepTrace::default());
        let step = Step {
            id: StepId::new(),
            settings: self.step_settings().await,
            intent,
            key: CacheKey::new(&context.domain, context.profile, &intent.element_name),
            context: &context,
            trace: &trace,
        };
        self.bounded(&step, self.resolve_step(&step)).await
    }

    /// Re-resolve after the execution layer reports that acting on a target failed.
    ///
    /// The cached entry for the element is dropped first, then healing runs directly.
    pub async fn recover(
        &self,
        intent: &Intent,
        failure: &ActionFailure,
    ) -> Result<Resolution, ResolutionError> {
        let context = self.current_context(intent)?;
        let trace = Mutex::new(StepTrace::default());
        let step = Step {
            id: StepId::new(),
            settings: self.step_settings().await,
            intent,
            key: CacheKey::new(&context.domain, context.profile, &intent.element_name),
            context: &context,
            trace: &trace,
        };
        if let Err(err) = self.cache.invalidate(&step.key) {
            warn!(target: "cache", key = %step.key, error = %err, "failed to drop entry before recovery");
        }
        info!(target: "heal", element = %intent.element_name, error = %failure, "recovering from action failure");
        let trigger = HealTrigger::ActionFailed {
            message: failure.message.clone(),
        };
        self.bounded(&step, async {
            let started = Instant::now();
            let scope = self.resolve_scope(&step).await?;
            self.heal(&step, scope.as_ref(), &trigger, false, started)
                .await
        })
        .await
    }

    /// Resolve, act, and on action failure recover once and act again.
    pub async fn resolve_and_act(
        &self,
        intent: &Intent,
        performer: &dyn ActionPerformer,
    ) -> Result<Resolution, ResolutionError> {
        let resolution = self.resolve(intent).await?;
        let failure = match performer.perform(intent, &resolution).await {
            Ok(()) => return Ok(resolution),
            Err(failure) => failure,
        };
        warn!(
            element = %intent.element_name,
            target = %resolution.target,
            error = %failure,
            "action failed, recovering"
        );
        let healed = self.recover(intent, &failure).await?;
        performer
            .perform(intent, &healed)
            .await
            .map_err(ResolutionError::Action)?;
        Ok(healed)
    }

    /// Cache shape and the classifier stay fixed; per-step timing follows the policy center.
    async fn step_settings(&self) -> EngineSettings {
        match &self.policy {
            Some(center) => EngineSettings::from_policy_center(center.as_ref()).await,
            None => self.settings.clone(),
        }
    }

    fn current_context(&self, intent: &Intent) -> Result<PageContext, ResolutionError> {
        intent
            .validate()
            .map_err(|err| ResolutionError::InvalidIntent(err.to_string()))?;
        self.page_context().ok_or(ResolutionError::NoPageContext)
    }

    async fn bounded<F>(&self, step: &Step<'_>, work: F) -> Result<Resolution, ResolutionError>
    where
        F: std::future::Future<Output = Result<Resolution, ResolutionError>>,
    {
        let deadline = step.settings.step_timeout(step.context.profile);
        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    element = %step.intent.element_name,
                    timeout_ms = deadline.as_millis() as u64,
                    "step timed out"
                );
                let failure = step
                    .trace
                    .lock()
                    .failure(FailureReason::Timeout)
                    .with_detail(format!("step exceeded {}ms", deadline.as_millis()));
                Err(failure.into())
            }
        }
    }

    async fn resolve_step(&self, step: &Step<'_>) -> Result<Resolution, ResolutionError> {
        let started = Instant::now();
        let scope = self.resolve_scope(step).await?;

        if let Some(resolution) = self.try_cache(step, scope.as_ref(), started).await? {
            return Ok(resolution);
        }

        let profile = step.context.profile;
        let outcome = self
            .discovery
            .discover(step.intent, scope.as_ref(), step.settings.idle_timeout(profile))
            .await
            .map_err(|err| self.locator_failure(step, err))?;
        let tried = outcome.tried();
        step.trace.lock().strategies.extend(tried.iter().copied());

        let Some(probe) = outcome.matched else {
            self.emit(step, Subsystem::Discovery, "discovery.no_match", json!({
                "tried": tried.iter().map(|s| s.name()).collect::<Vec<_>>(),
            }))
            .await;
            return self
                .heal(step, scope.as_ref(), &HealTrigger::NoMatch, false, started)
                .await;
        };
        self.emit(step, Subsystem::Discovery, "discovery.matched", json!({
            "strategy": probe.strategy.name(),
            "tier": probe.strategy.tier(),
            "confidence": probe.confidence,
            "stability": probe.stability,
        }))
        .await;

        let report = self
            .verify(step, &probe.locator, scope.as_ref(), profile)
            .await?;
        match report.failing_reason {
            None => {
                self.finish(step, probe, &report, ResolutionSource::Discovery, 0, started)
                    .await
            }
            Some(reason) => {
                step.trace.lock().last_failing_reason = Some(reason);
                self.heal(
                    step,
                    scope.as_ref(),
                    &HealTrigger::GateRejected { reason },
                    true,
                    started,
                )
                .await
            }
        }
    }

    /// Primary hint, then fallback. Missing both is terminal.
    async fn resolve_scope(&self, step: &Step<'_>) -> Result<Option<ScopeHandle>, ResolutionError> {
        let Some(primary) = &step.intent.scope_hint else {
            return Ok(None);
        };
        let hints = std::iter::once(primary).chain(step.intent.fallback_scope.as_ref());
        for hint in hints {
            let found = self
                .scopes
                .resolve_scope(hint)
                .await
                .map_err(|err| self.locator_failure(step, err))?;
            if let Some(handle) = found {
                self.emit(step, Subsystem::Scope, "scope.resolved", json!({
                    "hint": hint,
                    "role": handle.role,
                    "fallback": hint != primary,
                }))
                .await;
                return Ok(Some(handle));
            }
        }
        self.emit(step, Subsystem::Scope, "scope.not_found", json!({
            "hint": primary,
            "fallback": step.intent.fallback_scope,
        }))
        .await;
        Err(step
            .trace
            .lock()
            .failure(FailureReason::ScopeNotFound)
            .with_detail(primary.clone())
            .into())
    }

    /// A verified cache hit, or `None` to fall through to discovery.
    async fn try_cache(
        &self,
        step: &Step<'_>,
        scope: Option<&ScopeHandle>,
        started: Instant,
    ) -> Result<Option<Resolution>, ResolutionError> {
        let Some(entry) = self.cache.get(&step.key) else {
            self.emit(step, Subsystem::Cache, "cache.miss", json!({ "key": step.key.to_string() }))
                .await;
            return Ok(None);
        };
        let (kind, source) = match entry.tier_of_origin {
            CacheTier::Fast => ("cache.hit_fast", ResolutionSource::CacheFast),
            CacheTier::Durable => ("cache.hit_durable", ResolutionSource::CacheDurable),
        };
        self.emit(step, Subsystem::Cache, kind, json!({
            "key": step.key.to_string(),
            "strategy": entry.strategy.name(),
        }))
        .await;

        let root = scope.map(|s| &s.node);
        let nodes = resolve_locator(self.port.as_ref(), root, &entry.locator)
            .await
            .map_err(|err| self.port_failure(step, err))?;
        let current = match nodes.as_slice() {
            [node] => Some(
                self.port
                    .region_fingerprint(node)
                    .await
                    .map_err(|err| self.port_failure(step, err))?,
            ),
            _ => None,
        };
        match self.cache.check_drift(&entry, current.as_ref()) {
            Ok(check) if check.invalidated => {
                self.emit(step, Subsystem::Cache, "cache.drift_invalidated", json!({
                    "key": step.key.to_string(),
                    "drift": check.drift,
                    "threshold": self.cache.drift_threshold(),
                }))
                .await;
                return Ok(None);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "cache", key = %step.key, error = %err, "drift check failed, rediscovering");
                return Ok(None);
            }
        }

        let report = self
            .verify(step, &entry.locator, scope, step.context.profile)
            .await?;
        let Some(target) = report.node.clone().filter(|_| report.passed()) else {
            // rejected hit: drop it and rediscover
            if let Some(reason) = report.failing_reason {
                step.trace.lock().last_failing_reason = Some(reason);
            }
            if let Err(err) = self.cache.invalidate(&step.key) {
                warn!(target: "cache", key = %step.key, error = %err, "failed to drop rejected entry");
            }
            return Ok(None);
        };
        if let Err(err) = self.cache.refresh(&step.key) {
            warn!(target: "cache", key = %step.key, error = %err, "failed to refresh entry");
        }
        debug!(target: "cache", key = %step.key, source = source.name(), "served from cache");
        Ok(Some(Resolution {
            step_id: step.id.clone(),
            target,
            locator: entry.locator,
            strategy: entry.strategy,
            confidence: entry.confidence,
            stability: entry.stability,
            source,
            rounds: 0,
            elapsed: started.elapsed(),
        }))
    }

    async fn verify(
        &self,
        step: &Step<'_>,
        locator: &Locator,
        scope: Option<&ScopeHandle>,
        profile: RuntimeProfile,
    ) -> Result<ActionabilityReport, ResolutionError> {
        let target = GateTarget::new(locator.clone(), scope.map(|s| s.node.clone()));
        let report = self
            .gate
            .verify(&target, &step.settings.gate_options(profile))
            .await
            .map_err(|err| self.locator_failure(step, LocatorError::Gate(err)))?;
        match report.failing_reason {
            None => {
                self.emit(step, Subsystem::Readiness, "readiness.passed", json!({
                    "locator": locator.to_string(),
                    "samples": report.samples.len(),
                    "elapsed_ms": report.elapsed_ms,
                }))
                .await
            }
            Some(reason) => {
                self.emit(step, Subsystem::Readiness, "readiness.failed", json!({
                    "locator": locator.to_string(),
                    "reason": reason.name(),
                    "match_count": report.match_count,
                }))
                .await
            }
        }
        Ok(report)
    }

    async fn heal(
        &self,
        step: &Step<'_>,
        scope: Option<&ScopeHandle>,
        trigger: &HealTrigger,
        mut ever_matched: bool,
        started: Instant,
    ) -> Result<Resolution, ResolutionError> {
        let healer = HealingEngine::new(
            self.discovery.clone(),
            self.gate.clone(),
            self.history.clone(),
            step.settings.heal_params(step.context.profile),
        )
        .with_emitter(self.emitter.clone());
        let outcome = healer
            .heal(
                step.intent,
                &step.context.domain,
                scope,
                trigger,
                Some(&step.id),
            )
            .await
            .map_err(|err| self.locator_failure(step, err))?;
        {
            let mut trace = step.trace.lock();
            trace.rounds = outcome.rounds();
            trace.strategies.extend(outcome.strategies_tried());
        }

        match outcome {
            HealOutcome::Healed {
                probe,
                report,
                round,
                ..
            } => {
                self.finish(step, probe, &report, ResolutionSource::Healed, round, started)
                    .await
            }
            HealOutcome::Exhausted {
                attempts,
                last_failing_reason,
                ..
            } => {
                ever_matched |= attempts
                    .iter()
                    .any(|a| !matches!(a.outcome, AttemptOutcome::NoMatch));
                let reason = if ever_matched {
                    FailureReason::Exhausted
                } else {
                    FailureReason::NoStrategyMatched
                };
                let mut trace = step.trace.lock();
                if last_failing_reason.is_some() {
                    trace.last_failing_reason = last_failing_reason;
                }
                let failure = trace.failure(reason);
                warn!(element = %step.intent.element_name, %failure, "step failed");
                Err(failure.into())
            }
        }
    }

    /// Build the resolution and offer it to the cache (volatile results are refused there).
    async fn finish(
        &self,
        step: &Step<'_>,
        probe: ProbeResult,
        report: &ActionabilityReport,
        source: ResolutionSource,
        rounds: u8,
        started: Instant,
    ) -> Result<Resolution, ResolutionError> {
        let target = report.node.clone().unwrap_or_else(|| probe.node.clone());
        let fingerprint = self
            .port
            .region_fingerprint(&target)
            .await
            .map_err(|err| self.port_failure(step, err))?;
        let entry = CacheEntry::new(
            step.key.clone(),
            probe.locator.clone(),
            probe.strategy,
            probe.confidence,
            probe.stability,
            fingerprint,
        );
        match self.cache.put(&entry) {
            Ok(PutOutcome::Stored) => {
                self.emit(step, Subsystem::Cache, "cache.stored", json!({
                    "key": step.key.to_string(),
                    "strategy": probe.strategy.name(),
                    "promoted": probe.promoted,
                }))
                .await
            }
            Ok(PutOutcome::RejectedVolatile) => {}
            Err(err) => {
                warn!(target: "cache", key = %step.key, error = %err, "failed to store entry")
            }
        }
        let resolution = Resolution {
            step_id: step.id.clone(),
            target,
            locator: probe.locator,
            strategy: probe.strategy,
            confidence: probe.confidence,
            stability: probe.stability,
            source,
            rounds,
            elapsed: started.elapsed(),
        };
        info!(
            element = %step.intent.element_name,
            strategy = resolution.strategy.name(),
            source = source.name(),
            rounds,
            elapsed_ms = resolution.elapsed.as_millis() as u64,
            "resolved"
        );
        Ok(resolution)
    }

    async fn emit(&self, step: &Step<'_>, subsystem: Subsystem, kind: &str, detail: serde_json::Value) {
        self.emitter
            .emit(
                EngineEvent::new(subsystem, kind)
                    .element(step.intent.element_name.clone())
                    .step(&step.id)
                    .detail(detail),
            )
            .await;
    }

    fn port_failure(&self, step: &Step<'_>, err: PortError) -> ResolutionError {
        warn!(element = %step.intent.element_name, error = %err, "page driver failed");
        step.trace
            .lock()
            .failure(FailureReason::Port)
            .with_detail(err.to_string())
            .into()
    }

    fn locator_failure(&self, step: &Step<'_>, err: LocatorError) -> ResolutionError {
        match err {
            LocatorError::ScopeNotFound(hint) => step
                .trace
                .lock()
                .failure(FailureReason::ScopeNotFound)
                .with_detail(hint)
                .into(),
            LocatorError::InvalidIntent(reason) => ResolutionError::InvalidIntent(reason),
            LocatorError::InvalidPattern { .. } => ResolutionError::Config(err.to_string()),
            other => {
                warn!(element = %step.intent.element_name, error = %other, "resolution fault");
                step.trace
                    .lock()
                    .failure(FailureReason::Port)
                    .with_detail(other.to_string())
                    .into()
            }
        }
    }
}

/// URL host, lowercased, without a leading `www.`.
pub fn domain_of(url: &str) -> Result<String, ResolutionError> {
    let parsed = Url::parse(url).map_err(|err| ResolutionError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })?;
    let host = parsed.host_str().ok_or_else(|| ResolutionError::InvalidUrl {
        url: url.to_string(),
        reason: "no host".into(),
    })?;
    let host = host.to_ascii_lowercase();
    Ok(host
        .strip_prefix("www.")
        .map(str::to_string)
        .unwrap_or(host))
}
