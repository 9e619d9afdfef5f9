//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use bsec_conduit_config::ConduitSettings;

use crate::bootstrap::BootstrapError;
use crate::controller::{ConduitFault, ConduitState};
use crate::health::HealthReporter;
use crate::provision::{ArtifactKind, ArtifactOutcome};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// An artifact was checked.
    ArtifactChecked(ArtifactKind, ArtifactOutcome),
    /// The controller moved between states.
    StateChanged(ConduitState, ConduitState),
    /// The conduit faulted with a message.
    Faulted(String),
    /// Shutdown escalated to a kill.
    ShutdownEscalated(u32),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// State transitions in the order they were reported.
    #[must_use]
    pub fn transitions(&self) -> Vec<(ConduitState, ConduitState)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::StateChanged(from, to) => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Fault messages in the order they were reported.
    #[must_use]
    pub fn faults(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::Faulted(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Artifact outcomes in the order they were reported.
    #[must_use]
    pub fn artifacts(&self) -> Vec<(ArtifactKind, ArtifactOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::ArtifactChecked(kind, outcome) => Some((kind, outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _settings: &ConduitSettings) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn artifact_checked(&self, kind: ArtifactKind, outcome: ArtifactOutcome) {
        self.record(HealthEvent::ArtifactChecked(kind, outcome));
    }

    fn state_changed(&self, from: ConduitState, to: ConduitState) {
        self.record(HealthEvent::StateChanged(from, to));
    }

    fn conduit_faulted(&self, fault: &ConduitFault) {
        self.record(HealthEvent::Faulted(fault.to_string()));
    }

    fn shutdown_escalated(&self, pid: u32) {
        self.record(HealthEvent::ShutdownEscalated(pid));
    }
}
