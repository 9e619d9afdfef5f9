//! Launch sequencing: bootstrap, singleton guard, signals, then the conduit.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::controller::{ConduitController, ConduitOutcome, ControllerSettings, EventChannel};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::provision::ArtifactProvisioner;
use crate::publisher::{JsonLinePublisher, ReadingPublisher};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::guard::{ProcessGuard, ProcessPaths};
use super::signals::SignalForwarder;

/// Whether process signals are turned into termination requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMode {
    /// Install handlers for `SIGTERM`, `SIGINT`, `SIGQUIT` and `SIGHUP`.
    System,
    /// Leave signal dispositions alone; termination arrives via the channel.
    Disabled,
}

/// Collaborators required to run the daemon.
pub struct LaunchPlan {
    /// Configuration source.
    pub loader: Box<dyn ConfigLoader>,
    /// Health event sink.
    pub reporter: Arc<dyn HealthReporter>,
    /// Artifact provisioner.
    pub provisioner: ArtifactProvisioner,
    /// Sink for averaged readings.
    pub publisher: Box<dyn ReadingPublisher>,
    /// Event channel consumed by the controller.
    pub events: EventChannel,
    /// Signal handling mode.
    pub signals: SignalMode,
}

impl LaunchPlan {
    /// Production collaborators: layered configuration, structured health
    /// logs, the system compiler and JSON readings on stdout.
    #[must_use]
    pub fn system() -> Self {
        Self {
            loader: Box::new(SystemConfigLoader),
            reporter: Arc::new(StructuredHealthReporter::new()),
            provisioner: ArtifactProvisioner::default(),
            publisher: Box::new(JsonLinePublisher::stdout()),
            events: EventChannel::default(),
            signals: SignalMode::System,
        }
    }
}

impl fmt::Debug for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchPlan")
            .field("provisioner", &self.provisioner)
            .field("events", &self.events)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon() -> Result<ConduitOutcome, LaunchError> {
    run_daemon_with(LaunchPlan::system())
}

/// Runs the daemon with injected collaborators.
///
/// Errors are returned only for failures before the conduit starts; once
/// the controller runs, faults are reported through the outcome.
pub fn run_daemon_with(plan: LaunchPlan) -> Result<ConduitOutcome, LaunchError> {
    let LaunchPlan {
        loader,
        reporter,
        provisioner,
        publisher,
        events,
        signals,
    } = plan;

    info!(
        target: PROCESS_TARGET,
        ?signals,
        "starting conduit daemon"
    );
    let bootstrapped = bootstrap_with(loader.as_ref(), reporter.as_ref())?;
    let settings = bootstrapped.settings();
    let paths = ProcessPaths::under(settings.sensor().base_dir().as_std_path())?;
    let guard = ProcessGuard::acquire(paths)?;
    guard.write_pid(std::process::id())?;
    let _forwarder = match signals {
        SignalMode::System => Some(SignalForwarder::install(events.sender())?),
        SignalMode::Disabled => None,
    };

    let controller = ConduitController::new(
        ControllerSettings::from_settings(settings),
        reporter,
        publisher,
    );
    let outcome = controller.run(&provisioner, events);
    info!(
        target: PROCESS_TARGET,
        clean = outcome.is_clean(),
        "shutdown sequence completed"
    );
    Ok(outcome)
}
