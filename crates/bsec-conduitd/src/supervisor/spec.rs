//! Launch parameters and the environment snapshot handed to the child.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use bsec_conduit_config::SensorConfig;
use tracing::warn;

use super::SUPERVISOR_TARGET;
use crate::provision::ArtifactHandle;

const TIMEZONE_FILE: &str = "/etc/timezone";
const FALLBACK_TIMEZONE: &str = "UTC";

/// Immutable environment for the fusion process.
///
/// Captured once and passed by value so the daemon never needs to mutate its
/// own environment to configure the child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: Vec<(OsString, OsString)>,
}

impl EnvSnapshot {
    /// Host environment plus the resolved `TZ`.
    #[must_use]
    pub fn capture(timezone: Option<&str>) -> Self {
        let tz = resolve_timezone(timezone, Path::new(TIMEZONE_FILE));
        Self::from_vars(env::vars_os()).with("TZ", tz)
    }

    /// Snapshot of exactly the given variables.
    #[must_use]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns a copy with `key` set to `value`, replacing any existing entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let key = key.into();
        self.vars.retain(|(existing, _)| *existing != key);
        self.vars.push((key, value.into()));
        self
    }

    /// Value of a variable in the snapshot.
    #[must_use]
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        let key = key.as_ref();
        self.vars
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_os_str())
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }
}

/// Chooses the child's timezone: override, then the system file, then UTC.
pub(crate) fn resolve_timezone(override_tz: Option<&str>, system_file: &Path) -> String {
    if let Some(tz) = override_tz.map(str::trim).filter(|tz| !tz.is_empty()) {
        return tz.to_owned();
    }
    match fs::read_to_string(system_file) {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_owned(),
        _ => {
            warn!(
                target: SUPERVISOR_TARGET,
                file = %system_file.display(),
                fallback = FALLBACK_TIMEZONE,
                "could not determine timezone; using fallback"
            );
            FALLBACK_TIMEZONE.to_owned()
        }
    }
}

/// Everything needed to start the fusion process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: PathBuf,
    args: Vec<OsString>,
    env: EnvSnapshot,
    working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    /// Spec for an arbitrary program with no arguments and an empty environment.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: EnvSnapshot::default(),
            working_dir: None,
        }
    }

    /// Spec for the provisioned fusion executable.
    ///
    /// Positional arguments: I2C address, temperature offset, sample mode,
    /// supply voltage, tuning-state path and profile path.
    #[must_use]
    pub fn for_artifacts(artifacts: &ArtifactHandle, sensor: &SensorConfig, env: EnvSnapshot) -> Self {
        Self::new(artifacts.executable())
            .arg(sensor.i2c_address().as_u8().to_string())
            .arg(sensor.temp_offset().to_string())
            .arg(sensor.sample_rate().mode())
            .arg(sensor.voltage().to_string())
            .arg(artifacts.state())
            .arg(artifacts.profile())
            .env(env)
            .working_dir(sensor.base_dir().as_std_path())
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Replaces the environment snapshot.
    #[must_use]
    pub fn env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Environment snapshot.
    #[must_use]
    pub fn environment(&self) -> &EnvSnapshot {
        &self.env
    }

    pub(super) fn current_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::provision::ProfileId;
    use crate::tests::support::sensor_config;

    #[test]
    fn override_wins_over_system_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("timezone");
        fs::write(&file, "Europe/London\n").expect("write timezone");
        assert_eq!(resolve_timezone(Some("Asia/Tokyo"), &file), "Asia/Tokyo");
    }

    #[test]
    fn system_file_is_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("timezone");
        fs::write(&file, "Europe/London\n").expect("write timezone");
        assert_eq!(resolve_timezone(None, &file), "Europe/London");
    }

    #[test]
    fn missing_system_file_falls_back_to_utc() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(resolve_timezone(None, &dir.path().join("absent")), "UTC");
    }

    #[test]
    fn snapshot_replaces_existing_keys() {
        let env = EnvSnapshot::from_vars([("TZ", "UTC"), ("PATH", "/bin")]).with("TZ", "CET");
        assert_eq!(env.get("TZ"), Some(OsStr::new("CET")));
        assert_eq!(env.get("PATH"), Some(OsStr::new("/bin")));
        assert_eq!(env.iter().count(), 2);
    }

    #[test]
    fn capture_sets_timezone_without_touching_host_environment() {
        let before = env::var_os("TZ");
        let snapshot = EnvSnapshot::capture(Some("America/New_York"));
        assert_eq!(snapshot.get("TZ"), Some(OsStr::new("America/New_York")));
        assert_eq!(env::var_os("TZ"), before);
    }

    #[test]
    fn artifacts_map_to_positional_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sensor = sensor_config(dir.path());
        let artifacts = ArtifactHandle::new(
            PathBuf::from("/opt/bsec/bsec-library"),
            PathBuf::from("/opt/bsec/bsec-library.generic_33v_3s_4d.config"),
            PathBuf::from("/opt/bsec/bsec-library.state"),
            ProfileId::derive(sensor.voltage(), sensor.sample_rate(), sensor.retention()),
        );

        let spec = LaunchSpec::for_artifacts(&artifacts, &sensor, EnvSnapshot::default());

        let args: Vec<_> = spec
            .args()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "119",
                "0",
                "LP",
                "3.3",
                "/opt/bsec/bsec-library.state",
                "/opt/bsec/bsec-library.generic_33v_3s_4d.config",
            ]
        );
        assert_eq!(spec.program(), Path::new("/opt/bsec/bsec-library"));
        assert_eq!(spec.current_dir(), Some(dir.path()));
    }
}
