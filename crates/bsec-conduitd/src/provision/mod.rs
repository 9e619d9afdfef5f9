//! Provisioning of the fusion executable, calibration profile and tuning state.
//!
//! Every startup runs three independent checks against the base directory:
//!
//! 1. **Executable**: the recorded fingerprint must cover both the build
//!    inputs and the executable on disk, otherwise the driver source is
//!    rewritten and the toolchain invoked.
//! 2. **Profile**: the profile named by [`ProfileId::derive`] must exist,
//!    otherwise it is copied from the vendor calibration template.
//! 3. **Tuning state**: the blob must exist and be younger than the retention
//!    period, otherwise it is replaced by an empty file.
//!
//! The vendor source tree is only located when a check needs it, so a fully
//! provisioned base directory does not require the sources to remain present.

mod arch;
mod errors;
mod files;
mod fingerprint;
mod layout;
mod profile;
mod state;
mod toolchain;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bsec_conduit_config::SensorConfig;
use tracing::{info, warn};

use crate::health::HealthReporter;

pub use arch::{ArchProbe, MachineInfo, SystemArchProbe, TargetArch, detect};
pub use errors::ProvisionError;
pub use layout::ArtifactLayout;
pub use profile::ProfileId;
pub use toolchain::{BuildRequest, CcToolchain, Toolchain};

#[cfg(test)]
pub(crate) use toolchain::MockToolchain;

use fingerprint::{BuildFingerprint, file_digest, inputs_digest};

pub(crate) const PROVISION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provision");

/// Driver source compiled into the fusion executable.
pub(crate) const DRIVER_SOURCE: &str = include_str!("../../native/bsec-library.c");

const SOURCE_PREFIX: &str = "BSEC_";

/// Artifact inspected during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Compiled fusion executable.
    Executable,
    /// Calibration profile.
    Profile,
    /// Persisted tuning state.
    TuningState,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Executable => "executable",
            Self::Profile => "profile",
            Self::TuningState => "tuning_state",
        })
    }
}

/// What provisioning did with an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// The existing artifact was valid and left alone.
    Reused,
    /// The artifact did not exist and was created.
    Created,
    /// The artifact existed but was invalid and has been recreated.
    Replaced,
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reused => "reused",
            Self::Created => "created",
            Self::Replaced => "replaced",
        })
    }
}

/// Paths of the provisioned artifacts, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    executable: PathBuf,
    profile: PathBuf,
    state: PathBuf,
    profile_id: ProfileId,
}

impl ArtifactHandle {
    /// Builds a handle from already provisioned paths.
    #[must_use]
    pub fn new(executable: PathBuf, profile: PathBuf, state: PathBuf, profile_id: ProfileId) -> Self {
        Self {
            executable,
            profile,
            state,
            profile_id,
        }
    }

    /// Fusion executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Calibration profile passed to the executable.
    #[must_use]
    pub fn profile(&self) -> &Path {
        &self.profile
    }

    /// Tuning-state blob passed to the executable.
    #[must_use]
    pub fn state(&self) -> &Path {
        &self.state
    }

    /// Identifier of the selected profile.
    #[must_use]
    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }
}

/// Ensures the on-disk artifacts match the current configuration.
#[derive(Clone)]
pub struct ArtifactProvisioner {
    toolchain: Arc<dyn Toolchain>,
    probe: Arc<dyn ArchProbe>,
}

impl fmt::Debug for ArtifactProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactProvisioner").finish_non_exhaustive()
    }
}

impl Default for ArtifactProvisioner {
    fn default() -> Self {
        Self::new(Arc::new(CcToolchain::default()), Arc::new(SystemArchProbe))
    }
}

impl ArtifactProvisioner {
    /// Builds a provisioner with explicit toolchain and machine probe.
    #[must_use]
    pub fn new(toolchain: Arc<dyn Toolchain>, probe: Arc<dyn ArchProbe>) -> Self {
        Self { toolchain, probe }
    }

    /// Checks every artifact, rebuilding or recreating those that are invalid.
    ///
    /// Idempotent: a second call with unchanged inputs reuses everything.
    pub fn ensure(
        &self,
        config: &SensorConfig,
        reporter: &dyn HealthReporter,
    ) -> Result<ArtifactHandle, ProvisionError> {
        let layout = ArtifactLayout::new(config.base_dir().as_std_path());
        let mut sources = LazySources::new(config);

        let outcome = self.ensure_executable(&layout, &mut sources)?;
        reporter.artifact_checked(ArtifactKind::Executable, outcome);

        let profile_id = ProfileId::derive(
            config.voltage(),
            config.sample_rate(),
            config.retention(),
        );
        let profile = layout.profile(&profile_id);
        let outcome = ensure_profile(&profile, &profile_id, &mut sources)?;
        reporter.artifact_checked(ArtifactKind::Profile, outcome);

        let outcome = state::ensure_state(
            layout.state(),
            config.retention().max_age(),
            SystemTime::now(),
        )?;
        reporter.artifact_checked(ArtifactKind::TuningState, outcome);

        Ok(ArtifactHandle {
            executable: layout.executable().to_path_buf(),
            profile,
            state: layout.state().to_path_buf(),
            profile_id,
        })
    }

    fn ensure_executable(
        &self,
        layout: &ArtifactLayout,
        sources: &mut LazySources<'_>,
    ) -> Result<ArtifactOutcome, ProvisionError> {
        let arch = detect(&self.probe.probe()?)?;
        let inputs = inputs_digest(DRIVER_SOURCE, arch.library_dir());
        let current = file_digest(layout.executable())
            .map_err(ProvisionError::artifact(layout.executable()))?;
        let recorded = BuildFingerprint::read(layout.fingerprint());

        let outcome = match (&current, &recorded) {
            (Some(actual), Some(recorded))
                if recorded.inputs == inputs && recorded.executable == *actual =>
            {
                info!(
                    target: PROVISION_TARGET,
                    file = %layout.executable().display(),
                    "fingerprint matches; skipping build"
                );
                return Ok(ArtifactOutcome::Reused);
            }
            (None, _) => {
                info!(
                    target: PROVISION_TARGET,
                    file = %layout.executable().display(),
                    "fusion executable not found; building"
                );
                ArtifactOutcome::Created
            }
            (Some(_), _) => {
                warn!(
                    target: PROVISION_TARGET,
                    file = %layout.executable().display(),
                    "fusion executable does not match its fingerprint; rebuilding"
                );
                ArtifactOutcome::Replaced
            }
        };

        let source_dir = sources.get()?.to_path_buf();
        files::atomic_write(layout.source(), DRIVER_SOURCE.as_bytes())
            .map_err(ProvisionError::artifact(layout.source()))?;
        self.toolchain.build(&BuildRequest {
            source_dir,
            driver_source: layout.source().to_path_buf(),
            arch,
            output: layout.executable().to_path_buf(),
        })?;

        let executable = file_digest(layout.executable())
            .map_err(ProvisionError::artifact(layout.executable()))?
            .ok_or_else(|| ProvisionError::MissingExecutable {
                path: layout.executable().to_path_buf(),
            })?;
        let fingerprint = BuildFingerprint { inputs, executable };
        files::atomic_write(layout.fingerprint(), fingerprint.render().as_bytes())
            .map_err(ProvisionError::artifact(layout.fingerprint()))?;
        Ok(outcome)
    }
}

fn ensure_profile(
    path: &Path,
    id: &ProfileId,
    sources: &mut LazySources<'_>,
) -> Result<ArtifactOutcome, ProvisionError> {
    let outcome = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {
            info!(
                target: PROVISION_TARGET,
                profile = %id,
                file = %path.display(),
                "reusing calibration profile"
            );
            return Ok(ArtifactOutcome::Reused);
        }
        Ok(_) => ArtifactOutcome::Replaced,
        Err(_) => ArtifactOutcome::Created,
    };

    let template = sources
        .get()?
        .join("config")
        .join(id.as_str())
        .join("bsec_iaq.config");
    let contents = match fs::read(&template) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProvisionError::MissingTemplate { path: template });
        }
        Err(source) => return Err(ProvisionError::Artifact { path: template, source }),
    };
    files::atomic_write(path, &contents).map_err(ProvisionError::artifact(path))?;
    info!(
        target: PROVISION_TARGET,
        profile = %id,
        file = %path.display(),
        "created calibration profile from template"
    );
    Ok(outcome)
}

/// Vendor source directory, resolved on first use.
struct LazySources<'a> {
    config: &'a SensorConfig,
    resolved: Option<PathBuf>,
}

impl<'a> LazySources<'a> {
    fn new(config: &'a SensorConfig) -> Self {
        Self {
            config,
            resolved: None,
        }
    }

    fn get(&mut self) -> Result<&Path, ProvisionError> {
        if self.resolved.is_none() {
            self.resolved = Some(locate_sources(self.config)?);
        }
        self.resolved
            .as_deref()
            .ok_or_else(|| ProvisionError::MissingSources {
                base_dir: self.config.base_dir().as_std_path().to_path_buf(),
            })
    }
}

fn locate_sources(config: &SensorConfig) -> Result<PathBuf, ProvisionError> {
    if let Some(configured) = config.source_dir() {
        let path = configured.as_std_path();
        if !path.is_dir() {
            return Err(ProvisionError::SourceDirectory {
                path: path.to_path_buf(),
            });
        }
        return Ok(path.to_path_buf());
    }

    let base_dir = config.base_dir().as_std_path();
    let entries = fs::read_dir(base_dir).map_err(ProvisionError::artifact(base_dir))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SOURCE_PREFIX))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    let found = candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionError::MissingSources {
            base_dir: base_dir.to_path_buf(),
        })?;
    info!(
        target: PROVISION_TARGET,
        dir = %found.display(),
        "using vendor sources"
    );
    Ok(found)
}
