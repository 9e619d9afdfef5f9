use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use super::errors::ProvisionError;
use super::{ArtifactOutcome, PROVISION_TARGET};

/// Ensures the tuning-state file exists and is young enough to reuse.
///
/// The fusion executable owns the contents; the daemon only decides whether
/// the blob survives, based on modification time.
pub(super) fn ensure_state(
    path: &Path,
    max_age: Duration,
    now: SystemTime,
) -> Result<ArtifactOutcome, ProvisionError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            create_empty(path)?;
            info!(
                target: PROVISION_TARGET,
                file = %path.display(),
                "created blank tuning state"
            );
            return Ok(ArtifactOutcome::Created);
        }
        Err(source) => {
            return Err(ProvisionError::Artifact {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let modified = metadata
        .modified()
        .map_err(ProvisionError::artifact(path))?;
    // A timestamp in the future reads as zero age.
    let age = now.duration_since(modified).unwrap_or_default();
    if age <= max_age {
        info!(
            target: PROVISION_TARGET,
            file = %path.display(),
            age_s = age.as_secs(),
            "reusing tuning state"
        );
        return Ok(ArtifactOutcome::Reused);
    }

    create_empty(path)?;
    warn!(
        target: PROVISION_TARGET,
        file = %path.display(),
        age_s = age.as_secs(),
        max_age_s = max_age.as_secs(),
        "tuning state older than retention period; replaced with blank state"
    );
    Ok(ArtifactOutcome::Replaced)
}

fn create_empty(path: &Path) -> Result<(), ProvisionError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .map(drop)
        .map_err(ProvisionError::artifact(path))
}
