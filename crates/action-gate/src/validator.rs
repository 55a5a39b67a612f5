//! Actionability gate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use page_port::PagePort;
use tokio::time::timeout;
use tracing::debug;

use crate::conditions::*;
use crate::errors::GateError;
use crate::types::*;

/// Actionability gate trait
#[async_trait]
pub trait ActionabilityGate: Send + Sync {
    /// Run the five checks against `target`, short-circuiting on the first failure.
    async fn verify(
        &self,
        target: &GateTarget,
        options: &GateOptions,
    ) -> Result<ActionabilityReport, GateError>;
}

/// Default gate over a [`PagePort`]
pub struct DefaultActionabilityGate {
    port: Arc<dyn PagePort>,
}

impl DefaultActionabilityGate {
    pub fn new(port: Arc<dyn PagePort>) -> Self {
        Self { port }
    }

    async fn run_checks(
        &self,
        target: &GateTarget,
        options: &GateOptions,
    ) -> Result<ActionabilityReport, GateError> {
        let port = self.port.as_ref();
        let mut report = ActionabilityReport::empty();

        let matches = check_unique(port, target.scope.as_ref(), &target.locator)
            .await
            .map_err(|err| GateError::port(Check::Unique.name(), err))?;
        report.match_count = matches.len();
        if matches.len() != 1 {
            return Ok(fail(report, FailingReason::NotUnique));
        }
        report.unique = true;
        let node = matches.into_iter().next();
        report.node = node.clone();
        let Some(node) = node else {
            return Ok(fail(report, FailingReason::NotUnique));
        };

        let state = port
            .inspect(&node)
            .await
            .map_err(|err| GateError::port(Check::Visible.name(), err))?;
        if !check_visible(&state) {
            return Ok(fail(report, FailingReason::NotVisible));
        }
        report.visible = true;

        if !check_enabled(&state) {
            return Ok(fail(report, FailingReason::Disabled));
        }
        report.enabled = true;

        let samples =
            sample_bounding_boxes(port, &node, options.samples, options.interval)
                .await
                .map_err(|err| GateError::port(Check::Stable.name(), err))?;
        match samples {
            Some(samples) if samples_agree(&samples, options.tolerance_px) => {
                report.samples = samples;
            }
            Some(samples) => {
                debug!(
                    target: "readiness",
                    node = %node,
                    spread = max_spread(&samples),
                    tolerance = options.tolerance_px,
                    "bounding box unstable"
                );
                report.samples = samples;
                return Ok(fail(report, FailingReason::Unstable));
            }
            None => return Ok(fail(report, FailingReason::Unstable)),
        }
        report.stable_bbox = true;

        let scoped = check_scoped(port, target.scope.as_ref(), &node)
            .await
            .map_err(|err| GateError::port(Check::Scoped.name(), err))?;
        if !scoped {
            return Ok(fail(report, FailingReason::OutOfScope));
        }
        report.scoped = true;

        Ok(report)
    }
}

#[async_trait]
impl ActionabilityGate for DefaultActionabilityGate {
    async fn verify(
        &self,
        target: &GateTarget,
        options: &GateOptions,
    ) -> Result<ActionabilityReport, GateError> {
        if options.samples == 0 {
            return Err(GateError::InvalidOptions(
                "at least one stability sample is required".into(),
            ));
        }
        let start = Instant::now();
        let outcome = timeout(options.timeout, self.run_checks(target, options)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(result) => {
                let mut report = result?;
                report.elapsed_ms = elapsed_ms;
                report
            }
            Err(_) => ActionabilityReport::timed_out(elapsed_ms),
        };

        debug!(
            target: "readiness",
            locator = %target.locator,
            passed = report.passed(),
            reason = report.failing_reason.map(|r| r.name()).unwrap_or("-"),
            samples = options.samples,
            tolerance = options.tolerance_px,
            elapsed_ms,
            "gate verdict"
        );
        Ok(report)
    }
}

fn fail(mut report: ActionabilityReport, reason: FailingReason) -> ActionabilityReport {
    report.failing_reason = Some(reason);
    report
}
