//! Self-healing: bounded, forward-only reprobe ladder with learned strategy bias

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_gate::{scale_duration, ActionabilityGate, GateOptions, GateTarget, Widening};
use healkit_core_types::{Intent, StepId, StrategyId};
use healkit_event_bus::{EngineEvent, EventEmitter, Subsystem};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::history::HistoryStore;
use crate::resolver::DiscoveryEngine;
use crate::strategies::default_plan;
use crate::types::*;

/// Hard ceiling on healing rounds per intent.
pub const MAX_ROUNDS: u8 = 3;

/// Tuning for one healing sequence
#[derive(Debug, Clone, Copy)]
pub struct HealParams {
    /// Clamped to [`MAX_ROUNDS`]
    pub max_rounds: u8,
    pub learned_top_n: usize,
    /// Backoff before round `r` is `backoff * r`
    pub backoff: Duration,
    pub widening: Widening,
    /// Round-0 gate options; each round widens from here
    pub base_gate: GateOptions,
    pub idle_timeout: Duration,
}

impl HealParams {
    pub fn rounds(&self) -> u8 {
        self.max_rounds.min(MAX_ROUNDS)
    }
}

impl Default for HealParams {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            learned_top_n: 2,
            backoff: Duration::from_millis(100),
            widening: Widening::default(),
            base_gate: GateOptions::default(),
            idle_timeout: Duration::from_millis(2000),
        }
    }
}

/// Runs healing sequences against one page.
pub struct HealingEngine {
    discovery: Arc<DiscoveryEngine>,
    gate: Arc<dyn ActionabilityGate>,
    history: Arc<dyn HistoryStore>,
    emitter: EventEmitter,
    params: HealParams,
}

impl HealingEngine {
    pub fn new(
        discovery: Arc<DiscoveryEngine>,
        gate: Arc<dyn ActionabilityGate>,
        history: Arc<dyn HistoryStore>,
        params: HealParams,
    ) -> Self {
        Self {
            discovery,
            gate,
            history,
            emitter: EventEmitter::silent(),
            params,
        }
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn params(&self) -> &HealParams {
        &self.params
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Learned top-N first (history order), then the remaining tiers ascending.
    pub fn plan_for(&self, intent: &Intent, domain: &str) -> Vec<StrategyId> {
        let learned = match self.history.top_strategies(
            &intent.element_name,
            domain,
            self.params.learned_top_n,
        ) {
            Ok(learned) => learned,
            Err(err) => {
                warn!(target: "heal", error = %err, "strategy history unavailable, using default order");
                Vec::new()
            }
        };
        let mut plan = learned;
        for strategy in default_plan() {
            if !plan.contains(&strategy) {
                plan.push(strategy);
            }
        }
        plan
    }

    /// Start a fresh healing sequence; its cursor starts at the head of the plan.
    pub fn begin<'a>(
        &'a self,
        intent: &'a Intent,
        domain: &'a str,
        scope: Option<&'a ScopeHandle>,
    ) -> HealingSequence<'a> {
        let plan = self.plan_for(intent, domain);
        debug!(target: "heal", element = %intent.element_name, plan = ?plan, "healing plan");
        HealingSequence {
            engine: self,
            intent,
            domain,
            scope,
            plan,
            cursor: 0,
            attempts: Vec::new(),
        }
    }

    /// Run up to [`HealParams::rounds`] rounds. Stops early once the plan has nothing
    /// left that matches.
    pub async fn heal(
        &self,
        intent: &Intent,
        domain: &str,
        scope: Option<&ScopeHandle>,
        trigger: &HealTrigger,
        step_id: Option<&StepId>,
    ) -> Result<HealOutcome, LocatorError> {
        let mut sequence = self.begin(intent, domain, scope);
        let mut last_failing_reason = match trigger {
            HealTrigger::GateRejected { reason } => Some(*reason),
            _ => None,
        };
        let mut rounds = 0;

        for round in 1..=self.params.rounds() {
            let backoff = self.params.backoff.saturating_mul(u32::from(round));
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            rounds = round;
            self.emit(
                intent,
                step_id,
                "heal.round_started",
                json!({ "round": round, "trigger": trigger, "remaining": sequence.remaining() }),
            )
            .await;

            match sequence.heal_round(round).await? {
                RoundOutcome::Healed { probe, report } => {
                    info!(
                        target: "heal",
                        element = %intent.element_name,
                        strategy = probe.strategy.name(),
                        round,
                        "healed"
                    );
                    self.emit(
                        intent,
                        step_id,
                        "heal.succeeded",
                        json!({
                            "round": round,
                            "strategy": probe.strategy.name(),
                            "promoted": probe.promoted,
                        }),
                    )
                    .await;
                    return Ok(HealOutcome::Healed {
                        probe,
                        report,
                        round,
                        attempts: sequence.into_attempts(),
                    });
                }
                RoundOutcome::Rejected { reason } => {
                    last_failing_reason = Some(reason);
                    self.emit(
                        intent,
                        step_id,
                        "heal.round_failed",
                        json!({ "round": round, "reason": reason.name() }),
                    )
                    .await;
                }
                RoundOutcome::NoMatch => {
                    self.emit(
                        intent,
                        step_id,
                        "heal.round_failed",
                        json!({ "round": round, "reason": "no_match" }),
                    )
                    .await;
                    break;
                }
            }
        }

        let attempts = sequence.into_attempts();
        warn!(
            target: "heal",
            element = %intent.element_name,
            rounds,
            tried = attempts.len(),
            "healing exhausted"
        );
        self.emit(
            intent,
            step_id,
            "heal.exhausted",
            json!({
                "rounds": rounds,
                "strategies_tried": attempts.iter().map(|a| a.strategy.name()).collect::<Vec<_>>(),
                "last_failing_reason": last_failing_reason.map(|r| r.name()),
            }),
        )
        .await;
        Ok(HealOutcome::Exhausted {
            rounds,
            attempts,
            last_failing_reason,
        })
    }

    async fn emit(
        &self,
        intent: &Intent,
        step_id: Option<&StepId>,
        kind: &str,
        detail: serde_json::Value,
    ) {
        let mut event = EngineEvent::new(Subsystem::Heal, kind)
            .element(intent.element_name.clone())
            .detail(detail);
        if let Some(step_id) = step_id {
            event = event.step(step_id);
        }
        self.emitter.emit(event).await;
    }

    fn record(&self, intent: &Intent, domain: &str, strategy: StrategyId, success: bool, elapsed: Duration) {
        if let Err(err) =
            self.history
                .record(&intent.element_name, domain, strategy, success, elapsed)
        {
            warn!(target: "heal", error = %err, strategy = strategy.name(), "failed to record heal attempt");
        }
    }
}

/// One healing sequence: a plan and a cursor that only moves forward.
pub struct HealingSequence<'a> {
    engine: &'a HealingEngine,
    intent: &'a Intent,
    domain: &'a str,
    scope: Option<&'a ScopeHandle>,
    plan: Vec<StrategyId>,
    cursor: usize,
    attempts: Vec<HealAttempt>,
}

impl<'a> HealingSequence<'a> {
    pub fn plan(&self) -> &[StrategyId] {
        &self.plan
    }

    /// Strategies not yet consumed.
    pub fn remaining(&self) -> &[StrategyId] {
        &self.plan[self.cursor.min(self.plan.len())..]
    }

    pub fn attempts(&self) -> &[HealAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<HealAttempt> {
        self.attempts
    }

    /// Probe the rest of the plan with round-`round` widening and gate the first match.
    ///
    /// Every strategy the round consumes is recorded to history: non-matches and gate
    /// rejections as failures, the accepted one as a success.
    pub async fn heal_round(&mut self, round: u8) -> Result<RoundOutcome, LocatorError> {
        let params = self.engine.params;
        if self.remaining().is_empty() {
            return Ok(RoundOutcome::NoMatch);
        }
        let growth = 1.0 + f64::from(round) * params.widening.timeout_growth.max(0.0);
        let idle_timeout = scale_duration(params.idle_timeout, growth);
        let remaining = self.remaining().to_vec();

        let outcome = self
            .engine
            .discovery
            .discover_with_plan(self.intent, self.scope, &remaining, idle_timeout)
            .await?;
        self.cursor += outcome.trials.len();

        for trial in &outcome.trials {
            match trial.verdict {
                ProbeVerdict::NoMatch | ProbeVerdict::Ambiguous(_) => {
                    self.engine
                        .record(self.intent, self.domain, trial.strategy, false, trial.elapsed);
                    self.attempts.push(HealAttempt {
                        round,
                        strategy: trial.strategy,
                        outcome: AttemptOutcome::NoMatch,
                        elapsed: trial.elapsed,
                    });
                }
                ProbeVerdict::NotApplicable | ProbeVerdict::Matched => {}
            }
        }

        let Some(probe) = outcome.matched else {
            return Ok(RoundOutcome::NoMatch);
        };
        let probe_elapsed = outcome
            .trials
            .last()
            .map(|t| t.elapsed)
            .unwrap_or_default();

        let options = params.base_gate.for_round(round, &params.widening);
        let target = GateTarget::new(probe.locator.clone(), self.scope.map(|s| s.node.clone()));
        let started = Instant::now();
        let report = self.engine.gate.verify(&target, &options).await?;
        let elapsed = probe_elapsed + started.elapsed();

        match report.failing_reason {
            None => {
                self.engine
                    .record(self.intent, self.domain, probe.strategy, true, elapsed);
                self.attempts.push(HealAttempt {
                    round,
                    strategy: probe.strategy,
                    outcome: AttemptOutcome::Accepted,
                    elapsed,
                });
                Ok(RoundOutcome::Healed {
                    probe: probe.promote(),
                    report,
                })
            }
            Some(reason) => {
                debug!(target: "heal", round, strategy = probe.strategy.name(), reason = reason.name(), "candidate rejected");
                self.engine
                    .record(self.intent, self.domain, probe.strategy, false, elapsed);
                self.attempts.push(HealAttempt {
                    round,
                    strategy: probe.strategy,
                    outcome: AttemptOutcome::Rejected { reason },
                    elapsed,
                });
                Ok(RoundOutcome::Rejected { reason })
            }
        }
    }
}
