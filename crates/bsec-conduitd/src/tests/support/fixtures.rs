//! Filesystem fixtures: artifact directories, vendor trees and fake executables.

use std::fs;
use std::path::{Path, PathBuf};

use bsec_conduit_config::{RawSensorValues, SensorConfig};
use camino::Utf8PathBuf;

use crate::provision::{
    ArchProbe, BuildRequest, MachineInfo, ProfileId, ProvisionError, Toolchain,
};

/// Name of the fake vendor source directory.
pub const VENDOR_DIR: &str = "BSEC_1.4.7.4_Generic_Release";

/// Probe reporting a fixed machine.
#[derive(Debug, Clone)]
pub struct FixedProbe(pub MachineInfo);

impl FixedProbe {
    /// A Raspberry Pi 3 running a 32-bit kernel.
    #[must_use]
    pub fn pi_three() -> Self {
        Self(MachineInfo {
            os: "linux".to_owned(),
            machine: "armv7l".to_owned(),
            cpuinfo: Some("Hardware\t: BCM2835\nRevision\t: a02082\n".to_owned()),
        })
    }

    /// A Raspberry Pi Zero.
    #[must_use]
    pub fn pi_zero() -> Self {
        Self(MachineInfo {
            os: "linux".to_owned(),
            machine: "armv6l".to_owned(),
            cpuinfo: Some("Hardware\t: BCM2835\nRevision\t: 900093\n".to_owned()),
        })
    }
}

impl ArchProbe for FixedProbe {
    fn probe(&self) -> Result<MachineInfo, ProvisionError> {
        Ok(self.0.clone())
    }
}

/// Converts a temporary path into the UTF-8 form used by configuration.
#[must_use]
pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("temporary paths are UTF-8")
}

/// Default sensor parameters rooted at `base_dir`.
#[must_use]
pub fn sensor_config(base_dir: &Path) -> SensorConfig {
    sensor_config_with(base_dir, 3, 4)
}

/// Sensor parameters with an explicit sample rate and retention.
#[must_use]
pub fn sensor_config_with(base_dir: &Path, sample_rate: u32, retain_state: u32) -> SensorConfig {
    SensorConfig::new(RawSensorValues {
        i2c_address: 0x77,
        temp_offset: 0.0,
        sample_rate,
        voltage: 3.3,
        retain_state,
        base_dir: utf8(base_dir),
        source_dir: None,
    })
    .expect("fixture configuration is valid")
}

/// Creates a vendor tree with a calibration template for every profile.
pub fn seed_vendor_sources(base_dir: &Path) -> PathBuf {
    let root = base_dir.join(VENDOR_DIR);
    for voltage in ["18", "33"] {
        for rate in ["3", "300"] {
            for days in ["4", "28"] {
                let id = format!("generic_{voltage}v_{rate}s_{days}d");
                let dir = root.join("config").join(&id);
                fs::create_dir_all(&dir).expect("create template directory");
                fs::write(dir.join("bsec_iaq.config"), format!("profile:{id}"))
                    .expect("write template");
            }
        }
    }
    root
}

/// Reads a provisioned profile back.
#[must_use]
pub fn read_profile(base_dir: &Path, id: &ProfileId) -> String {
    fs::read_to_string(base_dir.join(format!("bsec-library.{id}.config")))
        .expect("profile should exist")
}

/// Writes an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    }
    path
}

/// One fusion output line.
#[must_use]
pub fn sample_line(iaq: f64, accuracy: u8, status: i32) -> String {
    format!(
        "{{\"Timestamp\": 1000, \"IAQ_Accuracy\": {accuracy}, \"IAQ\": {iaq:.2}, \
         \"Temperature\": 21.50, \"Humidity\": 40.25, \"Pressure\": 1013.25, \
         \"Gas\": 120000, \"Status\": {status}}}"
    )
}

/// Toolchain that "builds" the fusion executable as a shell script.
#[derive(Debug, Clone)]
pub struct ScriptToolchain {
    body: String,
}

impl ScriptToolchain {
    /// Installs `body` as the fusion executable on every build.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl Toolchain for ScriptToolchain {
    fn build(&self, request: &BuildRequest) -> Result<(), ProvisionError> {
        let dir = request
            .output
            .parent()
            .expect("executable lives in the base directory");
        let name = request
            .output
            .file_name()
            .and_then(|name| name.to_str())
            .expect("executable name is UTF-8");
        write_script(dir, name, &self.body);
        Ok(())
    }
}
