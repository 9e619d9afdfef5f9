//! Conduit orchestration.
//!
//! The controller walks a single fusion process through its life:
//!
//! ```text
//! Provisioning ─▶ Starting ─▶ Running ─▶ Draining ─▶ Stopped
//!                    │           │           ▲
//!                    │           ▼           │
//!                    └──────▶ Aborting ──────┘
//! ```
//!
//! `Running` drains decoded samples from a bounded channel and publishes an
//! averaged reading every reporting interval. Any fault (a non-zero engine
//! status, the output stream closing, or no first sample before the startup
//! deadline) moves to `Aborting`; the daemon then exits non-zero so the
//! service manager restarts it. Nothing is retried in-process.

mod pump;

use std::fmt;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::{Duration, Instant};

use bsec_conduit_config::{ConduitSettings, IaqDisplay, ReportingPolicy, SensorConfig};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregator::SampleAggregator;
use crate::decoder::RawSample;
use crate::health::HealthReporter;
use crate::provision::{ArtifactHandle, ArtifactProvisioner, ProvisionError};
use crate::publisher::ReadingPublisher;
use crate::supervisor::{
    ChildHandle, EnvSnapshot, LaunchSpec, ProcessSupervisor, SupervisorError,
};

pub(crate) const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_SLACK: Duration = Duration::from_secs(30);
const EXIT_GRACE: Duration = Duration::from_secs(1);
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_REQUEST_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle state of the conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConduitState {
    /// Checking and preparing artifacts.
    Provisioning,
    /// Child started; waiting for its first sample.
    Starting,
    /// Samples flowing; readings published on a timer.
    Running,
    /// A fault was detected; shutting down.
    Aborting,
    /// Stopping the child and flushing a final reading.
    Draining,
    /// Finished.
    Stopped,
}

impl fmt::Display for ConduitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Provisioning => "provisioning",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Aborting => "aborting",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// Events delivered to the controller thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ConduitEvent {
    /// A decoded sample.
    Sample(RawSample),
    /// The child's output stream ended.
    StreamClosed,
    /// External termination was requested.
    Terminate {
        /// Signal number that triggered the request.
        signal: i32,
    },
}

/// Bounded channel carrying [`ConduitEvent`]s to the controller.
#[derive(Debug)]
pub struct EventChannel {
    sender: SyncSender<ConduitEvent>,
    receiver: Receiver<ConduitEvent>,
}

impl EventChannel {
    /// Creates a channel holding at most `capacity` pending events.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        Self { sender, receiver }
    }

    /// A sender for producers outside the controller, e.g. signal handlers.
    #[must_use]
    pub fn sender(&self) -> SyncSender<ConduitEvent> {
        self.sender.clone()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::bounded(DEFAULT_EVENT_CAPACITY)
    }
}

/// Reasons the conduit gave up.
#[derive(Debug, Error)]
pub enum ConduitFault {
    /// Artifacts could not be prepared.
    #[error("provisioning failed: {source}")]
    Provisioning {
        /// Underlying provisioning error.
        #[source]
        source: ProvisionError,
    },
    /// The fusion process could not be started.
    #[error("failed to start fusion process: {source}")]
    Spawn {
        /// Underlying supervisor error.
        #[source]
        source: SupervisorError,
    },
    /// The output reader could not be started.
    #[error("failed to read fusion output: {source}")]
    Reader {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The fusion engine reported a non-zero status.
    #[error("fusion engine reported status {status}")]
    FatalStatus {
        /// Reported status code.
        status: i32,
    },
    /// The fusion process stopped producing output.
    #[error("fusion process exited unexpectedly ({status}); stderr: {stderr}")]
    UnexpectedExit {
        /// Exit status rendered for display.
        status: String,
        /// Last lines of the child's stderr.
        stderr: String,
    },
    /// No sample arrived before the startup deadline.
    #[error("no sample within {waited:?} of startup")]
    StartupTimeout {
        /// Time waited.
        waited: Duration,
    },
}

/// Final result of a conduit run.
#[derive(Debug)]
pub enum ConduitOutcome {
    /// Stopped on request.
    Clean,
    /// Stopped because of a fault.
    Faulted(ConduitFault),
}

impl ConduitOutcome {
    /// Whether the run ended without a fault.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Clean => ExitCode::SUCCESS,
            Self::Faulted(_) => ExitCode::FAILURE,
        }
    }
}

/// Runtime parameters of the controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    sensor: SensorConfig,
    report_interval: Duration,
    iaq_display: IaqDisplay,
    window_capacity: usize,
    shutdown_timeout: Duration,
    startup_timeout: Duration,
    timezone: Option<String>,
}

impl ControllerSettings {
    /// Derives controller parameters from sensor and reporting settings.
    ///
    /// The startup deadline is two sample intervals plus thirty seconds.
    #[must_use]
    pub fn new(sensor: SensorConfig, reporting: &ReportingPolicy) -> Self {
        let sample_interval = sensor.sample_rate().interval();
        Self {
            report_interval: reporting.interval(),
            iaq_display: reporting.iaq_display(),
            window_capacity: reporting.window_capacity(sample_interval),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            startup_timeout: sample_interval * 2 + STARTUP_SLACK,
            timezone: None,
            sensor,
        }
    }

    /// Builds settings from validated daemon configuration.
    #[must_use]
    pub fn from_settings(settings: &ConduitSettings) -> Self {
        Self::new(settings.sensor().clone(), settings.reporting())
            .with_shutdown_timeout(settings.shutdown_timeout())
            .with_timezone(settings.timezone().map(str::to_owned))
    }

    /// Overrides the `SIGTERM` grace period.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Overrides the first-sample deadline.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the timezone handed to the child.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
        self.timezone = timezone;
        self
    }

    /// Averaging window capacity.
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// First-sample deadline.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }
}

/// Drives provisioning, supervision, decoding and publishing.
pub struct ConduitController {
    settings: ControllerSettings,
    reporter: Arc<dyn HealthReporter>,
    publisher: Box<dyn ReadingPublisher>,
    supervisor: ProcessSupervisor,
    state: ConduitState,
    emitted_through: u64,
}

impl fmt::Debug for ConduitController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConduitController")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConduitController {
    /// Builds a controller in the `Provisioning` state.
    #[must_use]
    pub fn new(
        settings: ControllerSettings,
        reporter: Arc<dyn HealthReporter>,
        publisher: Box<dyn ReadingPublisher>,
    ) -> Self {
        Self {
            settings,
            supervisor: ProcessSupervisor::new(Arc::clone(&reporter)),
            reporter,
            publisher,
            state: ConduitState::Provisioning,
            emitted_through: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConduitState {
        self.state
    }

    /// Provisions artifacts, then runs the fusion process until it stops.
    pub fn run(self, provisioner: &ArtifactProvisioner, events: EventChannel) -> ConduitOutcome {
        match provisioner.ensure(&self.settings.sensor, &*self.reporter) {
            Ok(artifacts) => self.run_with_artifacts(&artifacts, events),
            Err(source) => self.finish(Some(ConduitFault::Provisioning { source })),
        }
    }

    /// Runs the provisioned fusion executable until it stops.
    pub fn run_with_artifacts(self, artifacts: &ArtifactHandle, events: EventChannel) -> ConduitOutcome {
        let env = EnvSnapshot::capture(self.settings.timezone.as_deref());
        let spec = LaunchSpec::for_artifacts(artifacts, &self.settings.sensor, env);
        self.run_spec(&spec, events)
    }

    /// Runs an arbitrary launch spec as the fusion process.
    pub fn run_spec(mut self, spec: &LaunchSpec, events: EventChannel) -> ConduitOutcome {
        if let Some(signal) = pending_termination(&events.receiver) {
            info!(
                target: CONTROLLER_TARGET,
                signal,
                "termination requested before the fusion process started"
            );
            return self.finish(None);
        }
        self.transition(ConduitState::Starting);
        let child = match self.supervisor.start(spec) {
            Ok(child) => child,
            Err(source) => return self.finish(Some(ConduitFault::Spawn { source })),
        };

        let aggregator = Arc::new(SampleAggregator::new(
            self.settings.window_capacity,
            self.settings.iaq_display,
        ));
        let EventChannel { sender, receiver } = events;
        let stdout = child
            .take_stdout()
            .ok_or_else(|| io::Error::other("fusion stdout was not captured"));
        let reader = match stdout.and_then(|out| pump::spawn(out, Arc::clone(&aggregator), sender)) {
            Ok(reader) => reader,
            Err(source) => {
                self.transition(ConduitState::Aborting);
                self.drain(&child);
                return self.finish(Some(ConduitFault::Reader { source }));
            }
        };

        let fault = self.supervise(&child, &receiver, &aggregator);
        drop(receiver);
        self.drain(&child);
        pump::join_within(reader, READER_JOIN_TIMEOUT);
        self.flush(&aggregator);
        self.finish(fault)
    }

    fn supervise(
        &mut self,
        child: &ChildHandle,
        events: &Receiver<ConduitEvent>,
        aggregator: &SampleAggregator,
    ) -> Option<ConduitFault> {
        let started = Instant::now();
        let startup_deadline = started + self.settings.startup_timeout;
        let mut next_emit = startup_deadline;

        loop {
            let deadline = if self.state == ConduitState::Running {
                next_emit
            } else {
                startup_deadline
            };
            match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(ConduitEvent::Sample(sample)) => {
                    if self.state == ConduitState::Starting {
                        self.transition(ConduitState::Running);
                        next_emit = Instant::now() + self.settings.report_interval;
                    }
                    if sample.status != 0 {
                        self.transition(ConduitState::Aborting);
                        return Some(ConduitFault::FatalStatus {
                            status: sample.status,
                        });
                    }
                }
                Ok(ConduitEvent::Terminate { signal }) => {
                    info!(
                        target: CONTROLLER_TARGET,
                        signal,
                        "termination requested"
                    );
                    return None;
                }
                Ok(ConduitEvent::StreamClosed) | Err(RecvTimeoutError::Disconnected) => {
                    // A service stop can kill the child before the daemon's own
                    // signal is forwarded.
                    if let Some(signal) = await_termination(events, STOP_REQUEST_GRACE) {
                        info!(
                            target: CONTROLLER_TARGET,
                            signal,
                            pid = child.pid(),
                            "termination requested as the fusion process exited"
                        );
                        return None;
                    }
                    warn!(
                        target: CONTROLLER_TARGET,
                        pid = child.pid(),
                        "fusion process ran out of data"
                    );
                    let status = match child.wait_exit(EXIT_GRACE) {
                        Ok(Some(status)) => status.to_string(),
                        Ok(None) => "still running".to_owned(),
                        Err(error) => error.to_string(),
                    };
                    self.transition(ConduitState::Aborting);
                    return Some(ConduitFault::UnexpectedExit {
                        status,
                        stderr: child.stderr_tail(),
                    });
                }
                Err(RecvTimeoutError::Timeout) if self.state == ConduitState::Running => {
                    self.publish(aggregator);
                    let now = Instant::now();
                    while next_emit <= now {
                        next_emit += self.settings.report_interval;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.transition(ConduitState::Aborting);
                    return Some(ConduitFault::StartupTimeout {
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }

    fn drain(&mut self, child: &ChildHandle) {
        self.transition(ConduitState::Draining);
        if let Err(error) = child.stop(self.settings.shutdown_timeout) {
            warn!(
                target: CONTROLLER_TARGET,
                pid = child.pid(),
                error = %error,
                "failed to stop fusion process"
            );
        }
    }

    fn flush(&mut self, aggregator: &SampleAggregator) {
        if aggregator.ingested_total() > self.emitted_through {
            debug!(target: CONTROLLER_TARGET, "flushing final reading");
            self.publish(aggregator);
        }
    }

    fn publish(&mut self, aggregator: &SampleAggregator) {
        let ingested = aggregator.ingested_total();
        let Some(reading) = aggregator.emit() else {
            debug!(
                target: CONTROLLER_TARGET,
                "no healthy samples buffered; skipping reading"
            );
            return;
        };
        self.emitted_through = ingested;
        match self.publisher.publish(&reading) {
            Ok(()) => debug!(
                target: CONTROLLER_TARGET,
                iaq = reading.iaq,
                accuracy = reading.accuracy,
                samples = reading.samples,
                "reading published"
            ),
            Err(error) => warn!(
                target: CONTROLLER_TARGET,
                error = %error,
                "failed to publish reading"
            ),
        }
    }

    fn finish(mut self, fault: Option<ConduitFault>) -> ConduitOutcome {
        self.transition(ConduitState::Stopped);
        match fault {
            Some(fault) => {
                self.reporter.conduit_faulted(&fault);
                ConduitOutcome::Faulted(fault)
            }
            None => ConduitOutcome::Clean,
        }
    }

    fn transition(&mut self, to: ConduitState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.reporter.state_changed(from, to);
    }
}

/// Consumes queued events, returning the signal of any termination request.
fn pending_termination(events: &Receiver<ConduitEvent>) -> Option<i32> {
    loop {
        match events.try_recv() {
            Ok(ConduitEvent::Terminate { signal }) => return Some(signal),
            Ok(_) => {}
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
        }
    }
}

/// Waits up to `grace` for a termination request, discarding other events.
fn await_termination(events: &Receiver<ConduitEvent>, grace: Duration) -> Option<i32> {
    let deadline = Instant::now() + grace;
    loop {
        match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(ConduitEvent::Terminate { signal }) => return Some(signal),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        }
    }
}
