//! The individual actionability checks

use std::time::Duration;

use page_port::{resolve_locator, BoundingBox, ElementState, Locator, NodeRef, PagePort, PortError};
use tokio::time::sleep;

/// Unique: the locator resolves to exactly one element under `root`.
pub async fn check_unique(
    port: &dyn PagePort,
    root: Option<&NodeRef>,
    locator: &Locator,
) -> Result<Vec<NodeRef>, PortError> {
    resolve_locator(port, root, locator).await
}

/// Visible: non-zero area, not hidden, not covered at its center.
pub fn check_visible(state: &ElementState) -> bool {
    state.visible
        && !state.obscured
        && state.bbox.map(|bbox| bbox.area() > 0.0).unwrap_or(false)
}

/// Enabled: neither disabled nor read-only.
pub fn check_enabled(state: &ElementState) -> bool {
    !state.disabled && !state.readonly
}

/// Stable: take `count` fresh layout reads `interval` apart.
///
/// Returns the samples; a `None` read (element vanished or hidden mid-sampling) ends
/// sampling early and the caller treats the sequence as unstable.
pub async fn sample_bounding_boxes(
    port: &dyn PagePort,
    node: &NodeRef,
    count: u32,
    interval: Duration,
) -> Result<Option<Vec<BoundingBox>>, PortError> {
    let mut samples = Vec::with_capacity(count as usize);
    for i in 0..count {
        if i > 0 && !interval.is_zero() {
            sleep(interval).await;
        }
        match port.bounding_box(node).await? {
            Some(bbox) => samples.push(bbox),
            None => return Ok(None),
        }
    }
    Ok(Some(samples))
}

/// Every pair of samples agrees within `tolerance` on position and size.
pub fn samples_agree(samples: &[BoundingBox], tolerance: f64) -> bool {
    samples.iter().enumerate().all(|(i, a)| {
        samples[i + 1..]
            .iter()
            .all(|b| a.agrees_with(b, tolerance))
    })
}

/// Largest coordinate difference between any two samples.
pub fn max_spread(samples: &[BoundingBox]) -> f64 {
    let mut spread = 0.0_f64;
    for (i, a) in samples.iter().enumerate() {
        for b in &samples[i + 1..] {
            spread = spread
                .max((a.x - b.x).abs())
                .max((a.y - b.y).abs())
                .max((a.width - b.width).abs())
                .max((a.height - b.height).abs());
        }
    }
    spread
}

/// Scoped: the candidate sits inside the scope container, when one was given.
pub async fn check_scoped(
    port: &dyn PagePort,
    scope: Option<&NodeRef>,
    node: &NodeRef,
) -> Result<bool, PortError> {
    match scope {
        Some(container) => port.contains(container, node).await,
        None => Ok(true),
    }
}
