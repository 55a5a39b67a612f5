//! Resolution error types
//!
//! Gate rejections and discovery non-matches never surface here; they are routed into
//! healing. What does surface is a terminal [`ResolutionFailure`] carrying enough to
//! classify the root cause without re-running the step.

use std::fmt;

use action_gate::FailingReason;
use healkit_core_types::StrategyId;
use page_port::PortError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a step could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The requested container (and its fallback) is not open
    ScopeNotFound,

    /// The per-step deadline elapsed
    Timeout,

    /// A candidate was found at some point but healing hit its round ceiling
    Exhausted,

    /// No strategy ever produced a candidate
    NoStrategyMatched,

    /// The page driver failed
    Port,
}

impl FailureReason {
    pub fn name(&self) -> &'static str {
        match self {
            FailureReason::ScopeNotFound => "scope_not_found",
            FailureReason::Timeout => "timeout",
            FailureReason::Exhausted => "exhausted",
            FailureReason::NoStrategyMatched => "no_strategy_matched",
            FailureReason::Port => "port",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal failure of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub reason: FailureReason,
    pub rounds_attempted: u8,
    /// Every strategy consumed across the initial pass and all healing rounds, in order
    pub strategies_tried: Vec<StrategyId>,
    pub last_failing_reason: Option<FailingReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ResolutionFailure {
    pub fn new(reason: FailureReason) -> Self {
        Self {
            reason,
            rounds_attempted: 0,
            strategies_tried: Vec::new(),
            last_failing_reason: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        write!(f, " after {} healing round(s)", self.rounds_attempted)?;
        if !self.strategies_tried.is_empty() {
            let tried: Vec<&str> = self.strategies_tried.iter().map(|s| s.name()).collect();
            write!(f, "; tried {}", tried.join(", "))?;
        }
        if let Some(reason) = self.last_failing_reason {
            write!(f, "; last gate failure: {}", reason)?;
        }
        Ok(())
    }
}

/// Failure reported by the execution layer when an action did not take effect
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionFailure {
    pub message: String,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("resolution failed: {0}")]
    Failed(ResolutionFailure),

    #[error("no page context; call on_navigation first")]
    NoPageContext,

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("port error: {0}")]
    Port(#[from] PortError),

    #[error("action failed after recovery: {0}")]
    Action(ActionFailure),
}

impl ResolutionError {
    /// The terminal step failure, if this is one.
    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            ResolutionError::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.failure().map(|f| f.reason)
    }
}

impl From<ResolutionFailure> for ResolutionError {
    fn from(failure: ResolutionFailure) -> Self {
        ResolutionError::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_names_rounds_and_strategies() {
        let failure = ResolutionFailure {
            reason: FailureReason::Exhausted,
            rounds_attempted: 3,
            strategies_tried: vec![StrategyId::SemanticLabel, StrategyId::Placeholder],
            last_failing_reason: Some(FailingReason::Disabled),
            detail: None,
        };
        assert_eq!(
            failure.to_string(),
            "exhausted after 3 healing round(s); tried semantic_label, placeholder; last gate failure: disabled"
        );
    }
}
