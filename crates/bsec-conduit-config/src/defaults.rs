use camino::Utf8PathBuf;

use crate::logging::{IaqDisplay, LogFormat};

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default I2C address of the sensor (`0x77`).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x77;

/// Default sample interval in seconds (low-power mode).
pub const DEFAULT_SAMPLE_RATE: u32 = 3;

/// Default supply voltage in volts.
pub const DEFAULT_VOLTAGE: f64 = 3.3;

/// Default tuning-state retention in days.
pub const DEFAULT_RETAIN_STATE: u32 = 4;

/// Default reporting interval in seconds.
pub const DEFAULT_REPORT_INTERVAL: u64 = 60;

/// Default window multiplier applied on top of one reporting interval.
pub const DEFAULT_CACHE_MULTIPLIER: u32 = 2;

/// Default grace period granted to the fusion process on shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 10;

/// Longest accepted reporting interval: one day.
pub const MAX_REPORT_INTERVAL: u64 = 86_400;

/// Largest accepted window multiplier.
pub const MAX_CACHE_MULTIPLIER: u32 = 100;

/// Longest accepted shutdown grace period: one hour.
pub const MAX_SHUTDOWN_TIMEOUT: u64 = 3_600;

/// Default log filter expression used by the daemon.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default IAQ presentation.
pub fn default_iaq_display() -> IaqDisplay {
    IaqDisplay::Raw
}

/// Artifacts live beside the daemon's working directory unless configured.
pub fn default_base_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}
