//! Core types for the locator system

use std::time::Duration;

use action_gate::{ActionabilityReport, FailingReason};
use chrono::{DateTime, Utc};
use healkit_core_types::{Intent, StabilityClass, StrategyId};
use page_port::{Locator, NodeRef, Query};
use serde::{Deserialize, Serialize};

/// One row of the strategy table
///
/// Descriptors are iterated in tier order with early exit; `build` turns an intent into
/// the query this strategy issues, or `None` when the strategy cannot apply.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    pub id: StrategyId,

    /// Confidence baseline reported for a match
    pub confidence: f64,

    /// Whether a match may be cached
    pub stability: StabilityClass,

    pub build: fn(&Intent) -> Option<Query>,
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("id", &self.id)
            .field("confidence", &self.confidence)
            .field("stability", &self.stability)
            .finish()
    }
}

/// A located candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Re-resolvable form of the match; this is what gets cached
    pub locator: Locator,

    /// Live handle at discovery time
    pub node: NodeRef,

    pub strategy: StrategyId,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    pub stability: StabilityClass,

    /// Set when a volatile match earned `stable` by surviving a heal
    #[serde(default)]
    pub promoted: bool,
}

impl ProbeResult {
    /// Healing winners are trusted for caching purposes.
    pub fn promote(mut self) -> Self {
        if self.stability != StabilityClass::Stable {
            self.stability = StabilityClass::Stable;
            self.promoted = true;
        }
        self
    }
}

/// What a single strategy yielded during a discovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeVerdict {
    /// Exactly one plausible candidate
    Matched,

    /// Several plausible candidates; not arbitrated
    Ambiguous(usize),

    /// No plausible candidate
    NoMatch,

    /// Strategy does not apply to this intent
    NotApplicable,
}

/// Per-strategy trace of a discovery pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTrial {
    pub strategy: StrategyId,
    pub verdict: ProbeVerdict,
    pub elapsed: Duration,
}

/// Result of one discovery pass over a strategy plan
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutcome {
    pub matched: Option<ProbeResult>,

    /// Every strategy consumed by the pass, in order, including the winner
    pub trials: Vec<StrategyTrial>,
}

impl DiscoveryOutcome {
    pub fn tried(&self) -> Vec<StrategyId> {
        self.trials.iter().map(|t| t.strategy).collect()
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// A resolved scope container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeHandle {
    pub node: NodeRef,

    /// The hint that located it
    pub hint: String,

    /// Container role, e.g. `dialog`
    pub role: String,
}

/// Learned outcome statistics for one (element, domain, strategy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealRecord {
    pub element: String,
    pub domain: String,
    pub strategy: StrategyId,
    pub success_count: u64,
    pub failure_count: u64,

    /// Incremental mean over every recorded attempt
    pub avg_duration_ms: f64,

    pub updated_at: DateTime<Utc>,
}

impl HealRecord {
    pub fn new(element: impl Into<String>, domain: impl Into<String>, strategy: StrategyId) -> Self {
        Self {
            element: element.into(),
            domain: domain.into(),
            strategy,
            success_count: 0,
            failure_count: 0,
            avg_duration_ms: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.success_count as f64 / n as f64,
        }
    }

    /// Fold one attempt in. Counts only ever grow.
    pub fn apply(&mut self, success: bool, duration: Duration) {
        if success {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        let n = self.attempts().max(1) as f64;
        let sample = duration.as_secs_f64() * 1000.0;
        self.avg_duration_ms += (sample - self.avg_duration_ms) / n;
        self.updated_at = Utc::now();
    }
}

/// Why healing was entered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealTrigger {
    /// The gate rejected the candidate
    GateRejected { reason: FailingReason },

    /// No strategy produced a plausible candidate
    NoMatch,

    /// The execution layer reported that the action itself failed
    ActionFailed { message: String },
}

/// How one strategy fared inside a healing round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    NoMatch,
    Rejected { reason: FailingReason },
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealAttempt {
    pub round: u8,
    pub strategy: StrategyId,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// Result of a single healing round
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// The round's candidate passed the widened gate
    Healed {
        probe: ProbeResult,
        report: ActionabilityReport,
    },

    /// A candidate was found but rejected
    Rejected { reason: FailingReason },

    /// Nothing left in the plan matched
    NoMatch,
}

/// Result of a full healing sequence
#[derive(Debug, Clone)]
pub enum HealOutcome {
    Healed {
        probe: ProbeResult,
        report: ActionabilityReport,
        round: u8,
        attempts: Vec<HealAttempt>,
    },
    Exhausted {
        rounds: u8,
        attempts: Vec<HealAttempt>,
        last_failing_reason: Option<FailingReason>,
    },
}

impl HealOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HealOutcome::Healed { .. })
    }

    pub fn attempts(&self) -> &[HealAttempt] {
        match self {
            HealOutcome::Healed { attempts, .. } | HealOutcome::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn rounds(&self) -> u8 {
        match self {
            HealOutcome::Healed { round, .. } => *round,
            HealOutcome::Exhausted { rounds, .. } => *rounds,
        }
    }

    /// Strategies tried across all rounds, in order.
    pub fn strategies_tried(&self) -> Vec<StrategyId> {
        self.attempts().iter().map(|a| a.strategy).collect()
    }
}
