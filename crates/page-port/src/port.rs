use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PortError;
use crate::model::{BoundingBox, ContentFingerprint, ElementState, Locator, NodeRef, PageSignals, Query};

/// Raw driver primitives the resolution core relies on.
///
/// Implementations wrap a real browser driver; [`crate::FixturePage`] is the in-memory one.
#[async_trait]
pub trait PagePort: Send + Sync {
    /// Evaluate a query under `root` (whole document when `None`), in document order.
    async fn query(&self, root: Option<&NodeRef>, query: &Query) -> Result<Vec<NodeRef>, PortError>;

    async fn inspect(&self, node: &NodeRef) -> Result<ElementState, PortError>;

    /// Fresh layout read; successive calls may differ while the element moves.
    async fn bounding_box(&self, node: &NodeRef) -> Result<Option<BoundingBox>, PortError>;

    async fn contains(&self, ancestor: &NodeRef, node: &NodeRef) -> Result<bool, PortError>;

    async fn region_fingerprint(&self, node: &NodeRef) -> Result<ContentFingerprint, PortError>;

    /// Wait for DOM/network quiescence, bounded by `timeout`.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), PortError>;

    async fn page_signals(&self) -> Result<PageSignals, PortError>;
}

/// Resolve a locator: run its query, drop action-incompatible elements, apply the ordinal.
pub async fn resolve_locator(
    port: &dyn PagePort,
    root: Option<&NodeRef>,
    locator: &Locator,
) -> Result<Vec<NodeRef>, PortError> {
    let raw = port.query(root, &locator.query).await?;
    let mut plausible = Vec::with_capacity(raw.len());
    for node in raw {
        match locator.action {
            Some(action) => {
                let state = port.inspect(&node).await?;
                if action.accepts(state.kind()) {
                    plausible.push(node);
                } else {
                    debug!(
                        node = %node,
                        action = action.name(),
                        "skipping candidate incompatible with action"
                    );
                }
            }
            None => plausible.push(node),
        }
    }
    match locator.ordinal {
        Some(n) if n >= 1 => Ok(plausible.into_iter().nth(n - 1).into_iter().collect()),
        _ => Ok(plausible),
    }
}
