//! Lifetime management of the fusion child process.

mod child;
mod errors;
mod spec;

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::info;

use crate::health::HealthReporter;

pub use child::{ChildHandle, StopOutcome};
pub use errors::SupervisorError;
pub use spec::{EnvSnapshot, LaunchSpec};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Starts fusion processes with an explicit environment.
#[derive(Clone)]
pub struct ProcessSupervisor {
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor").finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Builds a supervisor reporting escalations to `reporter`.
    #[must_use]
    pub fn new(reporter: Arc<dyn HealthReporter>) -> Self {
        Self { reporter }
    }

    /// Spawns the process described by `spec`.
    ///
    /// The child inherits nothing from the daemon's environment beyond what
    /// the snapshot carries. Stdout and stderr are piped. The child leads its
    /// own process group, so terminal signals aimed at the daemon do not reach
    /// it; the daemon stops it explicitly.
    pub fn start(&self, spec: &LaunchSpec) -> Result<ChildHandle, SupervisorError> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.args())
            .env_clear()
            .envs(spec.environment().iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(dir) = spec.current_dir() {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|source| SupervisorError::Spawn {
            program: spec.program().to_path_buf(),
            source,
        })?;
        info!(
            target: SUPERVISOR_TARGET,
            pid = child.id(),
            program = %spec.program().display(),
            args = ?spec.args(),
            "fusion process started"
        );
        Ok(ChildHandle::new(child, Arc::clone(&self.reporter)))
    }
}
