//! Layered policy for the resolution engine: builtin defaults, YAML file, env and
//! CLI-style overlays, plus TTL-bound runtime overrides.

pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod override_store;

pub use api::{InMemoryPolicyCenter, PolicyCenter, PolicyGuard};
pub use defaults::default_snapshot;
pub use errors::PolicyError;
pub use loader::{load_snapshot, load_snapshot_with_options, LoadOptions};
pub use model::{
    CachePolicy, GatePolicy, HealPolicy, PolicySnapshot, PolicySource, ProfilePolicy,
    ProfileScaled, ResolutionPolicy, RuntimeOverrideSpec, MAX_GROWTH, MAX_HEAL_ROUNDS,
};
