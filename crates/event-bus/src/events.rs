use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use healkit_core_types::StepId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::EventBus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Discovery,
    Cache,
    Scope,
    Readiness,
    Heal,
    Profile,
}

impl Subsystem {
    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Discovery => "discovery",
            Subsystem::Cache => "cache",
            Subsystem::Scope => "scope",
            Subsystem::Readiness => "readiness",
            Subsystem::Heal => "heal",
            Subsystem::Profile => "profile",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineEvent {
    pub subsystem: Subsystem,
    /// Dotted transition name, e.g. `cache.hit_fast`
    pub kind: String,
    pub element: Option<String>,
    pub step_id: Option<StepId>,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(subsystem: Subsystem, kind: impl Into<String>) -> Self {
        Self {
            subsystem,
            kind: kind.into(),
            element: None,
            step_id: None,
            detail: Value::Null,
            at: Utc::now(),
        }
    }

    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn step(mut self, step_id: &StepId) -> Self {
        self.step_id = Some(step_id.clone());
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Mirrors every event into `tracing` (target = subsystem) and onto the bus, if any.
#[derive(Clone, Default)]
pub struct EventEmitter {
    bus: Option<Arc<dyn EventBus<EngineEvent>>>,
}

impl EventEmitter {
    pub fn new(bus: Arc<dyn EventBus<EngineEvent>>) -> Self {
        Self { bus: Some(bus) }
    }

    /// Log-only emitter.
    pub fn silent() -> Self {
        Self { bus: None }
    }

    pub async fn emit(&self, event: EngineEvent) {
        let element = event.element.as_deref().unwrap_or("-");
        match event.subsystem {
            Subsystem::Discovery => {
                debug!(target: "discovery", kind = %event.kind, element, detail = %event.detail)
            }
            Subsystem::Cache => {
                debug!(target: "cache", kind = %event.kind, element, detail = %event.detail)
            }
            Subsystem::Scope => {
                debug!(target: "scope", kind = %event.kind, element, detail = %event.detail)
            }
            Subsystem::Readiness => {
                debug!(target: "readiness", kind = %event.kind, element, detail = %event.detail)
            }
            Subsystem::Heal => {
                debug!(target: "heal", kind = %event.kind, element, detail = %event.detail)
            }
            Subsystem::Profile => {
                debug!(target: "profile", kind = %event.kind, element, detail = %event.detail)
            }
        }
        if let Some(bus) = &self.bus {
            if let Err(err) = bus.publish(event).await {
                warn!("event publish failed: {}", err);
            }
        }
    }
}

/// Forward one subsystem's events into an mpsc channel, e.g. for a heal-only sink.
///
/// A lagging forwarder skips ahead; it stops when the bus closes or the receiver drops.
pub fn subscribe_subsystem(
    bus: &dyn EventBus<EngineEvent>,
    subsystem: Subsystem,
    capacity: usize,
) -> mpsc::Receiver<EngineEvent> {
    let mut rx = bus.subscribe();
    let (tx, out) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.subsystem == subsystem => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(subsystem = %subsystem, skipped, "event forwarder lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out
}
