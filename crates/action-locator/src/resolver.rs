//! Discovery engine: ordered strategy chain with early exit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use healkit_core_types::{Intent, StrategyId};
use page_port::{resolve_locator, Locator, PagePort, PortError};
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::strategies::{default_plan, descriptor};
use crate::types::*;

/// Runs strategy plans against a page.
pub struct DiscoveryEngine {
    port: Arc<dyn PagePort>,
    passes: AtomicU64,
}

impl DiscoveryEngine {
    pub fn new(port: Arc<dyn PagePort>) -> Self {
        Self {
            port,
            passes: AtomicU64::new(0),
        }
    }

    /// Number of discovery passes run by this engine.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run every tier in canonical order.
    pub async fn discover(
        &self,
        intent: &Intent,
        scope: Option<&ScopeHandle>,
        idle_timeout: Duration,
    ) -> Result<DiscoveryOutcome, LocatorError> {
        self.discover_with_plan(intent, scope, &default_plan(), idle_timeout)
            .await
    }

    /// Run `plan` in the given order, stopping at the first strategy that yields
    /// exactly one plausible candidate.
    ///
    /// A scope hint on the intent with no resolved `scope` fails fast: nothing is
    /// searched outside the intended container.
    pub async fn discover_with_plan(
        &self,
        intent: &Intent,
        scope: Option<&ScopeHandle>,
        plan: &[StrategyId],
        idle_timeout: Duration,
    ) -> Result<DiscoveryOutcome, LocatorError> {
        intent
            .validate()
            .map_err(|err| LocatorError::InvalidIntent(err.to_string()))?;
        if scope.is_none() {
            if let Some(hint) = &intent.scope_hint {
                debug!(target: "discovery", element = %intent.element_name, hint = %hint, "scope unresolved, not searching");
                return Err(LocatorError::ScopeNotFound(hint.clone()));
            }
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        self.wait_for_idle(idle_timeout).await?;

        let root = scope.map(|s| &s.node);
        let mut trials = Vec::with_capacity(plan.len());
        for strategy in plan {
            let started = Instant::now();
            let row = descriptor(*strategy);
            let Some(query) = (row.build)(intent) else {
                trials.push(StrategyTrial {
                    strategy: *strategy,
                    verdict: ProbeVerdict::NotApplicable,
                    elapsed: started.elapsed(),
                });
                continue;
            };
            let locator = Locator::new(query)
                .for_action(intent.action)
                .with_ordinal(intent.ordinal);
            let candidates = resolve_locator(self.port.as_ref(), root, &locator).await?;
            let verdict = match candidates.len() {
                0 => ProbeVerdict::NoMatch,
                1 => ProbeVerdict::Matched,
                n => ProbeVerdict::Ambiguous(n),
            };
            trials.push(StrategyTrial {
                strategy: *strategy,
                verdict,
                elapsed: started.elapsed(),
            });

            match verdict {
                ProbeVerdict::Matched => {
                    let Some(node) = candidates.into_iter().next() else {
                        continue;
                    };
                    info!(
                        target: "discovery",
                        element = %intent.element_name,
                        strategy = strategy.name(),
                        tier = strategy.tier(),
                        node = %node,
                        "matched"
                    );
                    return Ok(DiscoveryOutcome {
                        matched: Some(ProbeResult {
                            locator,
                            node,
                            strategy: *strategy,
                            confidence: row.confidence,
                            stability: row.stability,
                            promoted: false,
                        }),
                        trials,
                    });
                }
                ProbeVerdict::Ambiguous(n) => {
                    debug!(target: "discovery", strategy = strategy.name(), candidates = n, "ambiguous, moving on");
                }
                _ => {}
            }
        }

        debug!(target: "discovery", element = %intent.element_name, tried = trials.len(), "no strategy matched");
        Ok(DiscoveryOutcome {
            matched: None,
            trials,
        })
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), LocatorError> {
        match self.port.wait_for_idle(timeout).await {
            Ok(()) => Ok(()),
            // a page that never settles is still probed; the gate decides stability
            Err(PortError::Timeout(reason)) => {
                warn!(target: "discovery", %reason, "page not idle, probing anyway");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
