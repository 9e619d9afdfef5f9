//! Structured health reporting for conduit lifecycle events.

use std::sync::Arc;

use bsec_conduit_config::ConduitSettings;

use crate::bootstrap::BootstrapError;
use crate::controller::{ConduitFault, ConduitState};
use crate::provision::{ArtifactKind, ArtifactOutcome};

const HEALTH_TARGET: &str = "bsec_conduitd::health";

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after configuration has been loaded and validated.
    fn bootstrap_succeeded(&self, settings: &ConduitSettings);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once per artifact after provisioning checked it.
    fn artifact_checked(&self, kind: ArtifactKind, outcome: ArtifactOutcome);

    /// Invoked on every controller state transition.
    fn state_changed(&self, from: ConduitState, to: ConduitState);

    /// Invoked when the conduit gives up because of a fault.
    fn conduit_faulted(&self, fault: &ConduitFault);

    /// Invoked when the fusion process ignored `SIGTERM` and was killed.
    fn shutdown_escalated(&self, pid: u32);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, settings: &ConduitSettings) {
        (**self).bootstrap_succeeded(settings);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn artifact_checked(&self, kind: ArtifactKind, outcome: ArtifactOutcome) {
        (**self).artifact_checked(kind, outcome);
    }

    fn state_changed(&self, from: ConduitState, to: ConduitState) {
        (**self).state_changed(from, to);
    }

    fn conduit_faulted(&self, fault: &ConduitFault) {
        (**self).conduit_faulted(fault);
    }

    fn shutdown_escalated(&self, pid: u32) {
        (**self).shutdown_escalated(pid);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting conduit bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, settings: &ConduitSettings) {
        let sensor = settings.sensor();
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            i2c_address = %sensor.i2c_address(),
            sample_mode = sensor.sample_rate().mode(),
            voltage = %sensor.voltage(),
            retain_days = sensor.retention().days(),
            base_dir = %sensor.base_dir(),
            report_interval_s = settings.reporting().interval().as_secs(),
            window = settings.window_capacity(),
            "conduit bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "conduit bootstrap failed"
        );
    }

    fn artifact_checked(&self, kind: ArtifactKind, outcome: ArtifactOutcome) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "artifact_checked",
            artifact = %kind,
            outcome = %outcome,
            "artifact ready"
        );
    }

    fn state_changed(&self, from: ConduitState, to: ConduitState) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "state_changed",
            from = %from,
            to = %to,
            "conduit state changed"
        );
    }

    fn conduit_faulted(&self, fault: &ConduitFault) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "conduit_faulted",
            error = %fault,
            "conduit fault; exiting for service-manager restart"
        );
    }

    fn shutdown_escalated(&self, pid: u32) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "shutdown_escalated",
            pid,
            "fusion process ignored SIGTERM; killed"
        );
    }
}
