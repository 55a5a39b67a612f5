//! healkit: element resolution and self-healing for pages that drift
//!
//! [`ResolutionEngine`] turns an [`Intent`] ("fill Username") into a verified,
//! actionable target. It consults the selector cache first, falls back to the
//! discovery strategy chain, gates every candidate through the actionability checks,
//! and heals failed resolutions with a bounded, forward-only strategy ladder that
//! learns from history.
//!
//! The building blocks live in the workspace crates and are re-exported here.

pub mod config;
pub mod engine;
pub mod errors;
pub mod telemetry;

pub use config::{load_settings, EngineSettings};
pub use engine::{domain_of, ActionPerformer, EngineBuilder, PageContext, Resolution, ResolutionEngine};
pub use errors::{ActionFailure, FailureReason, ResolutionError, ResolutionFailure};

pub use action_gate::{ActionabilityReport, FailingReason, GateOptions};
pub use action_locator::{HistoryStore, InMemoryHistory, JsonFileHistory};
pub use healkit_core_types::{ActionKind, Intent, ResolutionSource, RuntimeProfile, StrategyId};
pub use healkit_event_bus::{EngineEvent, InMemoryBus, Subsystem};
pub use page_port::{FixtureNode, FixturePage, PagePort};
pub use selector_cache::{CachePipeline, CacheStats};
