//! Validation of raw configuration into the settings the daemon runs on.

use std::path;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;
use crate::defaults::{MAX_CACHE_MULTIPLIER, MAX_REPORT_INTERVAL, MAX_SHUTDOWN_TIMEOUT};
use crate::logging::IaqDisplay;
use crate::sensor::{RawSensorValues, SensorConfig};

/// A configuration value outside its supported domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The I2C address is neither `0x76` nor `0x77`.
    #[error("i2c_address must be 118 (0x76) or 119 (0x77), got {value}")]
    I2cAddress {
        /// Rejected value.
        value: u8,
    },
    /// The temperature offset lies outside `-10.0..=10.0`.
    #[error("temp_offset must lie between -10.0 and 10.0, got {value}")]
    TemperatureOffset {
        /// Rejected value.
        value: f64,
    },
    /// The sample interval is neither 3 nor 300 seconds.
    #[error("sample_rate must be 3 or 300, got {value}")]
    SampleRate {
        /// Rejected value.
        value: u32,
    },
    /// The supply voltage is neither 1.8 nor 3.3.
    #[error("voltage must be 3.3 or 1.8, got {value}")]
    Voltage {
        /// Rejected value.
        value: f64,
    },
    /// The retention period is neither 4 nor 28 days.
    #[error("retain_state must be 4 or 28, got {value}")]
    StateRetention {
        /// Rejected value.
        value: u32,
    },
    /// The reporting interval is zero or longer than a day.
    #[error(
        "report_interval must lie between 1 and {max} seconds, got {value}",
        max = MAX_REPORT_INTERVAL
    )]
    ReportInterval {
        /// Rejected value.
        value: u64,
    },
    /// The cache multiplier is zero or too large.
    #[error(
        "cache_multiplier must lie between 1 and {max}, got {value}",
        max = MAX_CACHE_MULTIPLIER
    )]
    CacheMultiplier {
        /// Rejected value.
        value: u32,
    },
    /// The shutdown grace period is longer than an hour.
    #[error(
        "shutdown_timeout must not exceed {max} seconds, got {value}",
        max = MAX_SHUTDOWN_TIMEOUT
    )]
    ShutdownTimeout {
        /// Rejected value.
        value: u64,
    },
    /// The base directory does not exist.
    #[error("base_dir '{path}' is not a directory")]
    BaseDirectory {
        /// Configured path.
        path: Utf8PathBuf,
    },
    /// The source directory cannot be made absolute.
    #[error("source_dir '{path}' cannot be resolved")]
    SourceDirectory {
        /// Configured path.
        path: Utf8PathBuf,
    },
}

/// Cadence and shape of published readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPolicy {
    interval: Duration,
    cache_multiplier: u32,
    iaq_display: IaqDisplay,
}

impl ReportingPolicy {
    /// Builds a policy from already validated parts.
    #[must_use]
    pub const fn new(interval: Duration, cache_multiplier: u32, iaq_display: IaqDisplay) -> Self {
        Self {
            interval,
            cache_multiplier,
            iaq_display,
        }
    }

    /// Time between two published readings.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of reporting intervals covered by the averaging window.
    #[must_use]
    pub const fn cache_multiplier(&self) -> u32 {
        self.cache_multiplier
    }

    /// Presentation of the IAQ value.
    #[must_use]
    pub const fn iaq_display(&self) -> IaqDisplay {
        self.iaq_display
    }

    /// Number of samples the averaging window holds for the given sample
    /// interval: `cache_multiplier × (interval ÷ sample_interval)`, never
    /// less than one.
    #[must_use]
    pub fn window_capacity(&self, sample_interval: Duration) -> usize {
        let per_interval = self
            .interval
            .as_millis()
            .checked_div(sample_interval.as_millis())
            .unwrap_or(0);
        let samples = per_interval.saturating_mul(u128::from(self.cache_multiplier));
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }
}

/// Resolves `dir` against the working directory without touching symlinks.
fn absolute(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let resolved = path::absolute(dir).ok()?;
    Utf8PathBuf::from_path_buf(resolved).ok()
}

/// Everything the daemon needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConduitSettings {
    sensor: SensorConfig,
    reporting: ReportingPolicy,
    shutdown_timeout: Duration,
    timezone: Option<String>,
}

impl ConduitSettings {
    /// Validates a loaded [`Config`].
    ///
    /// Relative `base_dir` and `source_dir` values are resolved against the
    /// current working directory here, once, so later path joins never depend
    /// on the child's working directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the first invalid field.
    pub fn from_config(config: &Config) -> Result<Self, ConfigurationError> {
        let base_dir = absolute(&config.base_dir)
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| ConfigurationError::BaseDirectory {
                path: config.base_dir.clone(),
            })?;
        let source_dir = match config.source_dir.as_deref() {
            Some(dir) => Some(absolute(dir).ok_or_else(|| ConfigurationError::SourceDirectory {
                path: dir.to_path_buf(),
            })?),
            None => None,
        };
        let sensor = SensorConfig::new(RawSensorValues {
            i2c_address: config.i2c_address,
            temp_offset: config.temp_offset,
            sample_rate: config.sample_rate,
            voltage: config.voltage,
            retain_state: config.retain_state,
            base_dir,
            source_dir,
        })?;
        if !(1..=MAX_REPORT_INTERVAL).contains(&config.report_interval) {
            return Err(ConfigurationError::ReportInterval {
                value: config.report_interval,
            });
        }
        if !(1..=MAX_CACHE_MULTIPLIER).contains(&config.cache_multiplier) {
            return Err(ConfigurationError::CacheMultiplier {
                value: config.cache_multiplier,
            });
        }
        if config.shutdown_timeout > MAX_SHUTDOWN_TIMEOUT {
            return Err(ConfigurationError::ShutdownTimeout {
                value: config.shutdown_timeout,
            });
        }
        let reporting = ReportingPolicy::new(
            Duration::from_secs(config.report_interval),
            config.cache_multiplier,
            config.iaq_display,
        );
        Ok(Self {
            sensor,
            reporting,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout),
            timezone: config.timezone.clone(),
        })
    }

    /// Validated sensor parameters.
    #[must_use]
    pub const fn sensor(&self) -> &SensorConfig {
        &self.sensor
    }

    /// Reporting cadence and presentation.
    #[must_use]
    pub const fn reporting(&self) -> &ReportingPolicy {
        &self.reporting
    }

    /// Grace period before the fusion process is killed.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Timezone override for the fusion process.
    #[must_use]
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    /// Averaging window capacity for the configured sample rate.
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.reporting
            .window_capacity(self.sensor.sample_rate().interval())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_config_validates() {
        let settings = ConduitSettings::from_config(&Config::default()).expect("valid defaults");
        assert_eq!(settings.reporting().interval(), Duration::from_secs(60));
        assert_eq!(settings.window_capacity(), 40);
    }

    #[rstest]
    #[case(60, 3, 2, 40)]
    #[case(60, 300, 2, 1)]
    #[case(600, 300, 3, 6)]
    #[case(30, 3, 1, 10)]
    fn window_capacity_scales_with_interval(
        #[case] report_secs: u64,
        #[case] sample_secs: u64,
        #[case] multiplier: u32,
        #[case] expected: usize,
    ) {
        let policy = ReportingPolicy::new(
            Duration::from_secs(report_secs),
            multiplier,
            IaqDisplay::Raw,
        );
        assert_eq!(
            policy.window_capacity(Duration::from_secs(sample_secs)),
            expected
        );
    }

    #[test]
    fn zero_sample_interval_yields_single_slot() {
        let policy = ReportingPolicy::new(Duration::from_secs(60), 2, IaqDisplay::Raw);
        assert_eq!(policy.window_capacity(Duration::ZERO), 1);
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_REPORT_INTERVAL + 1)]
    #[case(u64::MAX)]
    fn rejects_report_interval_out_of_range(#[case] value: u64) {
        let config = Config {
            report_interval: value,
            ..Config::default()
        };
        assert_eq!(
            ConduitSettings::from_config(&config),
            Err(ConfigurationError::ReportInterval { value })
        );
    }

    #[rstest]
    #[case(0)]
    #[case(MAX_CACHE_MULTIPLIER + 1)]
    #[case(u32::MAX)]
    fn rejects_cache_multiplier_out_of_range(#[case] value: u32) {
        let config = Config {
            cache_multiplier: value,
            ..Config::default()
        };
        assert_eq!(
            ConduitSettings::from_config(&config),
            Err(ConfigurationError::CacheMultiplier { value })
        );
    }

    #[test]
    fn rejects_excessive_shutdown_timeout() {
        let config = Config {
            shutdown_timeout: u64::MAX,
            ..Config::default()
        };
        assert_eq!(
            ConduitSettings::from_config(&config),
            Err(ConfigurationError::ShutdownTimeout { value: u64::MAX })
        );
    }

    #[test]
    fn largest_accepted_window_stays_modest() {
        let config = Config {
            report_interval: MAX_REPORT_INTERVAL,
            cache_multiplier: MAX_CACHE_MULTIPLIER,
            ..Config::default()
        };
        let settings = ConduitSettings::from_config(&config).expect("upper bounds are valid");
        assert_eq!(settings.window_capacity(), 2_880_000);
    }

    #[test]
    fn relative_base_dir_is_made_absolute() {
        let dir = tempfile::Builder::new()
            .prefix("relative-base")
            .tempdir_in(".")
            .expect("tempdir in working directory");
        let name = dir
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .expect("UTF-8 dir name");
        let config = Config {
            base_dir: Utf8PathBuf::from(name),
            source_dir: Some(Utf8PathBuf::from("vendor/BSEC_1.4")),
            ..Config::default()
        };

        let settings = ConduitSettings::from_config(&config).expect("relative dir is valid");

        let cwd = std::env::current_dir().expect("working directory");
        assert!(settings.sensor().base_dir().is_absolute());
        assert_eq!(settings.sensor().base_dir().as_std_path(), cwd.join(name));
        assert_eq!(
            settings.sensor().source_dir().map(Utf8Path::as_std_path),
            Some(cwd.join("vendor/BSEC_1.4").as_path())
        );
    }

    #[test]
    fn rejects_missing_base_dir() {
        let config = Config {
            base_dir: Utf8PathBuf::from("/definitely/not/here/bsec"),
            ..Config::default()
        };
        assert!(matches!(
            ConduitSettings::from_config(&config),
            Err(ConfigurationError::BaseDirectory { .. })
        ));
    }

    #[test]
    fn rejects_invalid_sensor_values() {
        let config = Config {
            voltage: 5.0,
            ..Config::default()
        };
        assert!(matches!(
            ConduitSettings::from_config(&config),
            Err(ConfigurationError::Voltage { .. })
        ));
    }
}
