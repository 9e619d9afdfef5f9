//! Sensor-fusion conduit daemon for the BME680 air-quality sensor.
//!
//! The daemon provisions a native fusion executable built against the
//! vendor's precompiled library, supervises it as a child process, decodes
//! its line-oriented JSON output and publishes windowed averages of IAQ,
//! temperature, humidity, pressure and gas resistance.
//!
//! Startup follows a fixed sequence: configuration is loaded and validated,
//! telemetry is installed, a singleton lock is taken in the artifact
//! directory, and the [`ConduitController`] takes over. The controller
//! ensures the executable, calibration profile and tuning state exist and
//! match the configuration, starts the child, and publishes a reading every
//! reporting interval until a termination signal arrives or the child
//! faults. Faults end the run with a non-zero exit status; restarting is
//! left to the service manager.

mod aggregator;
mod bootstrap;
mod controller;
mod decoder;
mod health;
mod process;
mod provision;
mod publisher;
mod supervisor;
mod telemetry;

pub use aggregator::{PublishedReading, SampleAggregator, SampleWindow};
pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use controller::{
    ConduitController, ConduitEvent, ConduitFault, ConduitOutcome, ConduitState,
    ControllerSettings, DEFAULT_EVENT_CAPACITY, EventChannel,
};
pub use decoder::{DecodeError, IaqAccuracy, RawSample, SampleDecoder, decode_line};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, LaunchPlan, ProcessPaths, SignalMode, run_daemon, run_daemon_with};
pub use provision::{
    ArchProbe, ArtifactHandle, ArtifactKind, ArtifactOutcome, ArtifactProvisioner, BuildRequest,
    CcToolchain, MachineInfo, ProfileId, ProvisionError, SystemArchProbe, TargetArch, Toolchain,
};
pub use publisher::{JsonLinePublisher, PublishError, ReadingPublisher};
pub use supervisor::{
    ChildHandle, EnvSnapshot, LaunchSpec, ProcessSupervisor, StopOutcome, SupervisorError,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
