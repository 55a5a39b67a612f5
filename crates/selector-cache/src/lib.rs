//! Two-tier selector cache.
//!
//! A [`CachePipeline`] composes a fast tier and a durable tier behind the [`Tier`]
//! trait: reads try fast then durable (warming the fast tier back on a durable hit),
//! writes go to both and only accept stable entries, and every hit can be checked for
//! drift against the page's current region fingerprint.

pub mod durable;
pub mod errors;
pub mod memory;
pub mod metrics;
pub mod pipeline;
pub mod tier;
pub mod types;

pub use durable::JsonFileTier;
pub use errors::CacheError;
pub use memory::MemoryTier;
pub use metrics::CacheStats;
pub use pipeline::CachePipeline;
pub use tier::Tier;
pub use types::{CacheEntry, CacheKey, CacheTier, DriftCheck, PutOutcome, TtlPolicy};
