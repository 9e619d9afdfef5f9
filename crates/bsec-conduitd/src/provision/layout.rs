//! On-disk layout of the artifacts owned by the provisioner.

use std::path::{Path, PathBuf};

use super::profile::ProfileId;

const EXECUTABLE_NAME: &str = "bsec-library";

/// Canonical artifact paths under the base directory.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    base_dir: PathBuf,
    executable: PathBuf,
    fingerprint: PathBuf,
    source: PathBuf,
    state: PathBuf,
}

impl ArtifactLayout {
    /// Derives every artifact path from the base directory.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            executable: base_dir.join(EXECUTABLE_NAME),
            fingerprint: base_dir.join(format!("{EXECUTABLE_NAME}.sha256")),
            source: base_dir.join(format!("{EXECUTABLE_NAME}.c")),
            state: base_dir.join(format!("{EXECUTABLE_NAME}.state")),
            base_dir,
        }
    }

    /// Directory holding every artifact.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Compiled fusion executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Fingerprint recorded after the last successful build.
    #[must_use]
    pub fn fingerprint(&self) -> &Path {
        &self.fingerprint
    }

    /// Driver source written before each build.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Tuning-state blob read and written by the fusion executable.
    #[must_use]
    pub fn state(&self) -> &Path {
        &self.state
    }

    /// Profile file for the given identifier.
    #[must_use]
    pub fn profile(&self, id: &ProfileId) -> PathBuf {
        self.base_dir.join(format!("{EXECUTABLE_NAME}.{id}.config"))
    }
}
