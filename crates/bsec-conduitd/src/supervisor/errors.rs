use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while starting or stopping the fusion process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The executable could not be started.
    #[error("failed to start fusion process '{program}': {source}")]
    Spawn {
        /// Executable path.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Delivering a signal failed.
    #[error("failed to signal fusion process {pid}: {source}")]
    Signal {
        /// Target process.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Querying or reaping the child failed.
    #[error("failed to wait for fusion process {pid}: {source}")]
    Wait {
        /// Target process.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
