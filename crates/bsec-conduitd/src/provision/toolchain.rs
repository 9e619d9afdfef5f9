//! Native toolchain seam used to compile the fusion executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::PROVISION_TARGET;
use super::arch::TargetArch;
use super::errors::ProvisionError;

/// Inputs for one build of the fusion executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Root of the unpacked vendor sources.
    pub source_dir: PathBuf,
    /// Driver source written by the provisioner.
    pub driver_source: PathBuf,
    /// Library flavour to link against.
    pub arch: TargetArch,
    /// Output executable path.
    pub output: PathBuf,
}

impl BuildRequest {
    fn library_path(&self) -> PathBuf {
        self.source_dir.join("algo").join("bin").join(self.arch.library_dir())
    }

    /// Compiler arguments for this request.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        let api = self.source_dir.join("API");
        let integration = self.source_dir.join("examples");
        let library = self.library_path();
        vec![
            "-Wall".to_owned(),
            "-Wno-unused-but-set-variable".to_owned(),
            "-Wno-unused-variable".to_owned(),
            "-static".to_owned(),
            format!("-iquote{}", api.display()),
            format!("-iquote{}", library.display()),
            format!("-iquote{}", integration.display()),
            display(&api.join("bme680.c")),
            display(&integration.join("bsec_integration.c")),
            display(&self.driver_source),
            format!("-L{}", library.display()),
            "-lalgobsec".to_owned(),
            "-lm".to_owned(),
            "-lrt".to_owned(),
            "-o".to_owned(),
            display(&self.output),
        ]
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Compiles the fusion executable.
#[cfg_attr(test, mockall::automock)]
pub trait Toolchain: Send + Sync {
    /// Runs a build, returning an error carrying diagnostics on failure.
    fn build(&self, request: &BuildRequest) -> Result<(), ProvisionError>;
}

/// Toolchain invoking the system C compiler.
#[derive(Debug, Clone)]
pub struct CcToolchain {
    program: String,
}

impl CcToolchain {
    /// Uses the given compiler executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CcToolchain {
    fn default() -> Self {
        Self::new("cc")
    }
}

impl Toolchain for CcToolchain {
    fn build(&self, request: &BuildRequest) -> Result<(), ProvisionError> {
        let arguments = request.arguments();
        debug!(
            target: PROVISION_TARGET,
            program = %self.program,
            args = ?arguments,
            "invoking toolchain"
        );
        let output = Command::new(&self.program)
            .args(&arguments)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProvisionError::ToolchainSpawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
            diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ProvisionError::BuildFailed {
                status: output.status.to_string(),
                diagnostics,
            });
        }
        info!(
            target: PROVISION_TARGET,
            output = %request.output.display(),
            arch = %request.arch,
            "fusion executable built"
        );
        Ok(())
    }
}
