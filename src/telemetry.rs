//! Tracing bootstrap
//!
//! Resolution code logs under one target per subsystem (`discovery`, `cache`, `scope`,
//! `readiness`, `heal`, `profile`), so `RUST_LOG=heal=debug,cache=info` narrows output
//! to the parts of a run being investigated.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Human-readable logs. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = env_filter(level)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!("tracing already initialised: {err}"))
}

/// One JSON object per event, for log shippers.
pub fn init_tracing_json(level: &str) -> Result<()> {
    let filter = env_filter(level)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_target(true))
        .try_init()
        .map_err(|err| anyhow!("tracing already initialised: {err}"))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            let level: tracing::Level = level.parse().context("Invalid log level")?;
            Ok(EnvFilter::new(level.to_string()))
        }
    }
}
