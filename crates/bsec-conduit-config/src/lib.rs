//! Shared configuration for the BSEC conduit daemon.
//!
//! [`Config`] is loaded through `ortho_config`, layering built-in defaults,
//! an optional TOML file (`--config-path` or `BSEC_CONDUIT_CONFIG_PATH`),
//! `BSEC_CONDUIT_*` environment variables and command-line flags, in that
//! order of precedence. The loaded values are deliberately loose: numbers and
//! paths exactly as the operator wrote them. [`ConduitSettings::from_config`]
//! turns them into the validated, typed domain the daemon runs on, rejecting
//! anything outside the sensor's supported options with a
//! [`ConfigurationError`].

mod defaults;
mod logging;
mod sensor;
mod settings;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CACHE_MULTIPLIER, DEFAULT_I2C_ADDRESS, DEFAULT_LOG_FILTER, DEFAULT_REPORT_INTERVAL,
    DEFAULT_RETAIN_STATE, DEFAULT_SAMPLE_RATE, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_VOLTAGE,
    MAX_CACHE_MULTIPLIER, MAX_REPORT_INTERVAL, MAX_SHUTDOWN_TIMEOUT, default_base_dir, default_iaq_display, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use logging::{IaqDisplay, LogFormat, LogFormatParseError};
pub use sensor::{
    I2cAddress, RawSensorValues, SampleRate, SensorConfig, StateRetention, SupplyVoltage,
};
pub use settings::{ConduitSettings, ConfigurationError, ReportingPolicy};

/// Raw daemon configuration as loaded from files, environment and CLI.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BSEC_CONDUIT")]
pub struct Config {
    /// `tracing` filter expression, e.g. `info` or `bsec_conduitd=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Sensor I2C address; `118` (`0x76`) or `119` (`0x77`).
    #[ortho_config(default = DEFAULT_I2C_ADDRESS)]
    pub i2c_address: u8,
    /// Temperature offset in °C applied by the fusion engine.
    #[ortho_config(default = 0.0)]
    pub temp_offset: f64,
    /// Sample interval in seconds; `3` or `300`.
    #[ortho_config(default = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,
    /// Sensor supply voltage; `3.3` or `1.8`.
    #[ortho_config(default = DEFAULT_VOLTAGE)]
    pub voltage: f64,
    /// Days of tuning state the fusion engine keeps; `4` or `28`.
    #[ortho_config(default = DEFAULT_RETAIN_STATE)]
    pub retain_state: u32,
    /// Directory holding the executable, profile and tuning state.
    #[ortho_config(default = default_base_dir())]
    pub base_dir: Utf8PathBuf,
    /// Unpacked vendor sources; discovered under `base_dir` when unset.
    pub source_dir: Option<Utf8PathBuf>,
    /// Seconds between published readings.
    #[ortho_config(default = DEFAULT_REPORT_INTERVAL)]
    pub report_interval: u64,
    /// Number of reporting intervals the averaging window spans.
    #[ortho_config(default = DEFAULT_CACHE_MULTIPLIER)]
    pub cache_multiplier: u32,
    /// Presentation of the IAQ value.
    #[ortho_config(default = default_iaq_display())]
    pub iaq_display: IaqDisplay,
    /// Seconds the fusion process is given to exit after `SIGTERM`.
    #[ortho_config(default = DEFAULT_SHUTDOWN_TIMEOUT)]
    pub shutdown_timeout: u64,
    /// Timezone handed to the fusion process; `/etc/timezone` when unset.
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            i2c_address: DEFAULT_I2C_ADDRESS,
            temp_offset: 0.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            voltage: DEFAULT_VOLTAGE,
            retain_state: DEFAULT_RETAIN_STATE,
            base_dir: default_base_dir(),
            source_dir: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            cache_multiplier: DEFAULT_CACHE_MULTIPLIER,
            iaq_display: default_iaq_display(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            timezone: None,
        }
    }
}

impl Config {
    /// Log filter expression handed to the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
