use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while preparing the fusion executable and its artifacts.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// No vendor source tree was configured or discovered.
    #[error(
        "vendor sources not found: expected a directory starting with 'BSEC_' under '{base_dir}'; \
         unpack the Bosch BSEC archive there or set source_dir"
    )]
    MissingSources {
        /// Directory that was searched.
        base_dir: PathBuf,
    },
    /// The configured source directory does not exist.
    #[error("configured source directory '{path}' is not a directory")]
    SourceDirectory {
        /// Configured path.
        path: PathBuf,
    },
    /// The host cannot run the vendor library.
    #[error("unsupported platform: {reason}")]
    UnsupportedPlatform {
        /// Human readable explanation.
        reason: String,
    },
    /// Querying the kernel for machine identification failed.
    #[error("failed to identify machine: {source}")]
    MachineProbe {
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// The toolchain could not be started.
    #[error("failed to run toolchain '{program}': {source}")]
    ToolchainSpawn {
        /// Compiler executable.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The toolchain ran and reported failure.
    #[error("build failed with status {status}:\n{diagnostics}")]
    BuildFailed {
        /// Exit status rendered for display.
        status: String,
        /// Merged compiler output.
        diagnostics: String,
    },
    /// The build reported success without producing the executable.
    #[error("build produced no executable at '{path}'")]
    MissingExecutable {
        /// Expected executable path.
        path: PathBuf,
    },
    /// The calibration template for the profile is missing.
    #[error("calibration template '{path}' not found")]
    MissingTemplate {
        /// Expected template path.
        path: PathBuf,
    },
    /// Reading or writing an artifact failed.
    #[error("failed to prepare artifact '{path}': {source}")]
    Artifact {
        /// Artifact path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(super) fn artifact(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Artifact { path, source }
    }
}
