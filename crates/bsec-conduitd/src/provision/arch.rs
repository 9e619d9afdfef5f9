//! Target architecture detection for the vendor algorithm library.

use std::fmt;
use std::fs;
use std::io;

use tracing::{debug, info};

use super::PROVISION_TARGET;
use super::errors::ProvisionError;

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Bit marking a "new style" Raspberry Pi revision code.
const NEW_STYLE_FLAG: u32 = 1 << 23;

/// Vendor library flavour selected for the host CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    /// 32-bit ARMv6 build, also used for ARMv7 hosts.
    ArmV6,
    /// 64-bit ARMv8-A build.
    ArmV8,
}

impl TargetArch {
    /// Library directory relative to `algo/bin` in the vendor sources.
    #[must_use]
    pub const fn library_dir(self) -> &'static str {
        match self {
            Self::ArmV6 => "Normal_version/RaspberryPI/PiZero_ArmV6-32bits",
            Self::ArmV8 => "Normal_version/RaspberryPI/PiThree_ArmV8-a-64bits",
        }
    }
}

impl fmt::Display for TargetArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ArmV6 => "armv6-32bit",
            Self::ArmV8 => "armv8-64bit",
        })
    }
}

/// Raw machine identification data used to choose a [`TargetArch`].
#[derive(Debug, Clone, Default)]
pub struct MachineInfo {
    /// Operating system name, e.g. `linux`.
    pub os: String,
    /// Kernel machine string, e.g. `armv7l` or `aarch64`.
    pub machine: String,
    /// Contents of `/proc/cpuinfo`, when readable.
    pub cpuinfo: Option<String>,
}

/// Source of machine identification data.
pub trait ArchProbe: Send + Sync {
    /// Collects identification data for the running host.
    fn probe(&self) -> Result<MachineInfo, ProvisionError>;
}

/// Probe backed by `uname(2)` and `/proc/cpuinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemArchProbe;

impl ArchProbe for SystemArchProbe {
    fn probe(&self) -> Result<MachineInfo, ProvisionError> {
        let uname = nix::sys::utsname::uname()
            .map_err(|source| ProvisionError::MachineProbe { source })?;
        let cpuinfo = match fs::read_to_string(CPUINFO_PATH) {
            Ok(text) => Some(text),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => {
                debug!(
                    target: PROVISION_TARGET,
                    file = CPUINFO_PATH,
                    error = %error,
                    "cpuinfo unreadable; falling back to machine string"
                );
                None
            }
        };
        Ok(MachineInfo {
            os: std::env::consts::OS.to_owned(),
            machine: uname.machine().to_string_lossy().into_owned(),
            cpuinfo,
        })
    }
}

/// Chooses the vendor library for the described host.
///
/// Raspberry Pi revision codes win over the machine string because 32-bit
/// kernels report `armv7l` on 64-bit capable boards.
pub fn detect(info: &MachineInfo) -> Result<TargetArch, ProvisionError> {
    if info.os != "linux" {
        return Err(ProvisionError::UnsupportedPlatform {
            reason: format!("the fusion library requires Linux, found {}", info.os),
        });
    }
    let machine = info.machine.to_ascii_lowercase();
    if !machine.starts_with("arm") && machine != "aarch64" {
        return Err(ProvisionError::UnsupportedPlatform {
            reason: format!("the fusion library requires an ARM CPU, found {}", info.machine),
        });
    }

    if let Some(arch) = info.cpuinfo.as_deref().and_then(arch_from_cpuinfo) {
        info!(
            target: PROVISION_TARGET,
            arch = %arch,
            "architecture detected from board revision"
        );
        return Ok(arch);
    }

    let arch = if machine.contains("armv8") || machine == "aarch64" {
        TargetArch::ArmV8
    } else {
        TargetArch::ArmV6
    };
    info!(
        target: PROVISION_TARGET,
        arch = %arch,
        machine = %info.machine,
        "architecture detected from machine string"
    );
    Ok(arch)
}

fn arch_from_cpuinfo(cpuinfo: &str) -> Option<TargetArch> {
    let revision = cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Revision").then(|| value.trim())
    })?;
    let code = u32::from_str_radix(revision, 16).ok()?;
    if code & NEW_STYLE_FLAG == 0 {
        // Old-style codes only ever shipped on BCM2835 boards.
        return Some(TargetArch::ArmV6);
    }
    match (code >> 12) & 0xF {
        0 | 1 => Some(TargetArch::ArmV6),
        2 | 3 => Some(TargetArch::ArmV8),
        _ => None,
    }
}
