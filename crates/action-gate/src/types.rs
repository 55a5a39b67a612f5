//! Gate data types

use std::fmt;
use std::time::Duration;

use page_port::{BoundingBox, Locator, NodeRef};
use serde::{Deserialize, Serialize};

/// The five actionability checks, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Unique,
    Visible,
    Enabled,
    Stable,
    Scoped,
}

impl Check {
    pub const ORDER: [Check; 5] = [
        Check::Unique,
        Check::Visible,
        Check::Enabled,
        Check::Stable,
        Check::Scoped,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Check::Unique => "unique",
            Check::Visible => "visible",
            Check::Enabled => "enabled",
            Check::Stable => "stable",
            Check::Scoped => "scoped",
        }
    }
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailingReason {
    /// Zero or several elements match the locator
    NotUnique,

    /// Zero area, hidden, or covered by an overlay
    NotVisible,

    /// Disabled or read-only
    Disabled,

    /// Bounding box moved between stability samples
    Unstable,

    /// Candidate is not a descendant of the requested scope
    OutOfScope,

    /// Verification did not finish within its time window
    Timeout,
}

impl FailingReason {
    pub fn name(&self) -> &'static str {
        match self {
            FailingReason::NotUnique => "not_unique",
            FailingReason::NotVisible => "not_visible",
            FailingReason::Disabled => "disabled",
            FailingReason::Unstable => "unstable",
            FailingReason::OutOfScope => "out_of_scope",
            FailingReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the gate verifies: a re-resolvable locator, optionally bounded by a scope
#[derive(Debug, Clone)]
pub struct GateTarget {
    pub locator: Locator,
    pub scope: Option<NodeRef>,
}

impl GateTarget {
    pub fn new(locator: Locator, scope: Option<NodeRef>) -> Self {
        Self { locator, scope }
    }
}

/// Outcome of one gate call
///
/// Checks after the first failure are not evaluated and report `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionabilityReport {
    pub unique: bool,
    pub visible: bool,
    pub enabled: bool,
    pub stable_bbox: bool,
    pub scoped: bool,
    pub failing_reason: Option<FailingReason>,

    /// The single element the locator resolved to, when unique
    pub node: Option<NodeRef>,

    /// Elements matched by the locator at verification time
    pub match_count: usize,

    /// Bounding-box samples taken by the stability check
    pub samples: Vec<BoundingBox>,

    pub elapsed_ms: u64,
}

impl ActionabilityReport {
    pub(crate) fn empty() -> Self {
        Self {
            unique: false,
            visible: false,
            enabled: false,
            stable_bbox: false,
            scoped: false,
            failing_reason: None,
            node: None,
            match_count: 0,
            samples: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub(crate) fn timed_out(elapsed_ms: u64) -> Self {
        Self {
            failing_reason: Some(FailingReason::Timeout),
            elapsed_ms,
            ..Self::empty()
        }
    }

    pub fn passed(&self) -> bool {
        self.failing_reason.is_none()
            && self.unique
            && self.visible
            && self.enabled
            && self.stable_bbox
            && self.scoped
    }
}

/// Per-round widening applied by [`GateOptions::for_round`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Widening {
    pub timeout_growth: f64,
    pub tolerance_growth: f64,
    pub extra_samples_per_round: u32,
}

impl Default for Widening {
    fn default() -> Self {
        Self {
            timeout_growth: 0.5,
            tolerance_growth: 0.5,
            extra_samples_per_round: 1,
        }
    }
}

/// `duration × factor`, saturating at [`Duration::MAX`] instead of panicking.
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Sampling and timing parameters for one gate call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOptions {
    pub samples: u32,
    pub interval: Duration,
    pub tolerance_px: f64,
    pub timeout: Duration,
}

impl GateOptions {
    pub fn new(samples: u32, interval: Duration, tolerance_px: f64, timeout: Duration) -> Self {
        Self {
            samples,
            interval,
            tolerance_px,
            timeout,
        }
    }

    /// Options for healing round `round`; round 0 is the unmodified baseline.
    ///
    /// Timeout, tolerance, sample count and sample interval never shrink as the round
    /// number grows.
    pub fn for_round(&self, round: u8, widening: &Widening) -> Self {
        let r = f64::from(round);
        let time_factor = 1.0 + r * widening.timeout_growth.max(0.0);
        let tolerance_factor = 1.0 + r * widening.tolerance_growth.max(0.0);
        Self {
            samples: self
                .samples
                .saturating_add(u32::from(round).saturating_mul(widening.extra_samples_per_round)),
            interval: scale_duration(self.interval, time_factor),
            tolerance_px: self.tolerance_px * tolerance_factor,
            timeout: scale_duration(self.timeout, time_factor),
        }
    }
}

impl Default for GateOptions {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50), 2.0, Duration::from_millis(1500))
    }
}
