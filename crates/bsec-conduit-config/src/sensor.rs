//! Validated sensor parameters.
//!
//! The fusion library ships calibration profiles for a closed set of
//! hardware options, so every field here is an enumeration rather than a
//! free number. Construction happens once, in
//! [`crate::ConduitSettings::from_config`].

use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::settings::ConfigurationError;

const SECONDS_PER_DAY: u64 = 86_400;
const VOLTAGE_TOLERANCE: f64 = 1e-6;

/// Maximum magnitude of the temperature offset, in °C.
pub(crate) const TEMP_OFFSET_LIMIT: f64 = 10.0;

/// I2C address the sensor answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum I2cAddress {
    /// `0x76`, SDO pulled low.
    Primary,
    /// `0x77`, SDO pulled high.
    Secondary,
}

impl I2cAddress {
    /// Numeric bus address.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Primary => 0x76,
            Self::Secondary => 0x77,
        }
    }
}

impl TryFrom<u8> for I2cAddress {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x76 => Ok(Self::Primary),
            0x77 => Ok(Self::Secondary),
            _ => Err(ConfigurationError::I2cAddress { value }),
        }
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Sampling cadence of the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    /// Low-power mode, one sample every 3 seconds.
    LowPower,
    /// Ultra-low-power mode, one sample every 300 seconds.
    UltraLowPower,
}

impl SampleRate {
    /// Seconds between two samples.
    #[must_use]
    pub const fn seconds(self) -> u32 {
        match self {
            Self::LowPower => 3,
            Self::UltraLowPower => 300,
        }
    }

    /// Time between two samples.
    #[must_use]
    pub const fn interval(self) -> Duration {
        Duration::from_secs(self.seconds() as u64)
    }

    /// Mode token understood by the fusion executable.
    #[must_use]
    pub const fn mode(self) -> &'static str {
        match self {
            Self::LowPower => "LP",
            Self::UltraLowPower => "ULP",
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = ConfigurationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::LowPower),
            300 => Ok(Self::UltraLowPower),
            _ => Err(ConfigurationError::SampleRate { value }),
        }
    }
}

/// Supply voltage of the sensor board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplyVoltage {
    /// 1.8 V supply.
    Low,
    /// 3.3 V supply.
    Standard,
}

impl SupplyVoltage {
    /// Nominal voltage in volts.
    #[must_use]
    pub const fn volts(self) -> f64 {
        match self {
            Self::Low => 1.8,
            Self::Standard => 3.3,
        }
    }

    /// Digits of the voltage without the decimal point, as used in profile
    /// names (`18`, `33`).
    #[must_use]
    pub const fn profile_tag(self) -> &'static str {
        match self {
            Self::Low => "18",
            Self::Standard => "33",
        }
    }

    fn parse(value: f64) -> Result<Self, ConfigurationError> {
        if (value - Self::Low.volts()).abs() < VOLTAGE_TOLERANCE {
            Ok(Self::Low)
        } else if (value - Self::Standard.volts()).abs() < VOLTAGE_TOLERANCE {
            Ok(Self::Standard)
        } else {
            Err(ConfigurationError::Voltage { value })
        }
    }
}

impl fmt::Display for SupplyVoltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.volts())
    }
}

/// How long the fusion engine's tuning state remains trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateRetention {
    /// Four days.
    Short,
    /// Twenty-eight days.
    Long,
}

impl StateRetention {
    /// Retention period in days.
    #[must_use]
    pub const fn days(self) -> u32 {
        match self {
            Self::Short => 4,
            Self::Long => 28,
        }
    }

    /// Maximum age of a tuning-state file before it is discarded.
    #[must_use]
    pub const fn max_age(self) -> Duration {
        Duration::from_secs(self.days() as u64 * SECONDS_PER_DAY)
    }
}

impl TryFrom<u32> for StateRetention {
    type Error = ConfigurationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Self::Short),
            28 => Ok(Self::Long),
            _ => Err(ConfigurationError::StateRetention { value }),
        }
    }
}

/// Immutable, validated sensor parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    i2c_address: I2cAddress,
    temp_offset: f64,
    sample_rate: SampleRate,
    voltage: SupplyVoltage,
    retention: StateRetention,
    base_dir: Utf8PathBuf,
    source_dir: Option<Utf8PathBuf>,
}

impl SensorConfig {
    /// Validates raw values against the sensor's supported options.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] encountered.
    pub fn new(raw: RawSensorValues) -> Result<Self, ConfigurationError> {
        let temp_offset = raw.temp_offset;
        if !temp_offset.is_finite() || temp_offset.abs() > TEMP_OFFSET_LIMIT {
            return Err(ConfigurationError::TemperatureOffset { value: temp_offset });
        }
        Ok(Self {
            i2c_address: I2cAddress::try_from(raw.i2c_address)?,
            temp_offset,
            sample_rate: SampleRate::try_from(raw.sample_rate)?,
            voltage: SupplyVoltage::parse(raw.voltage)?,
            retention: StateRetention::try_from(raw.retain_state)?,
            base_dir: raw.base_dir,
            source_dir: raw.source_dir,
        })
    }

    /// Bus address of the sensor.
    #[must_use]
    pub const fn i2c_address(&self) -> I2cAddress {
        self.i2c_address
    }

    /// Temperature offset in °C.
    #[must_use]
    pub const fn temp_offset(&self) -> f64 {
        self.temp_offset
    }

    /// Sampling cadence.
    #[must_use]
    pub const fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Supply voltage.
    #[must_use]
    pub const fn voltage(&self) -> SupplyVoltage {
        self.voltage
    }

    /// Tuning-state retention.
    #[must_use]
    pub const fn retention(&self) -> StateRetention {
        self.retention
    }

    /// Directory holding the daemon's artifacts.
    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Explicitly configured vendor source directory, if any.
    #[must_use]
    pub fn source_dir(&self) -> Option<&Utf8Path> {
        self.source_dir.as_deref()
    }
}

/// Unvalidated sensor values, as found in [`crate::Config`].
#[derive(Debug, Clone)]
pub struct RawSensorValues {
    /// Bus address.
    pub i2c_address: u8,
    /// Temperature offset in °C.
    pub temp_offset: f64,
    /// Sample interval in seconds.
    pub sample_rate: u32,
    /// Supply voltage in volts.
    pub voltage: f64,
    /// Retention in days.
    pub retain_state: u32,
    /// Artifact directory.
    pub base_dir: Utf8PathBuf,
    /// Vendor source directory.
    pub source_dir: Option<Utf8PathBuf>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn raw() -> RawSensorValues {
        RawSensorValues {
            i2c_address: 0x77,
            temp_offset: 0.0,
            sample_rate: 3,
            voltage: 3.3,
            retain_state: 4,
            base_dir: Utf8PathBuf::from("."),
            source_dir: None,
        }
    }

    #[test]
    fn accepts_defaults() {
        let config = SensorConfig::new(raw()).expect("defaults should validate");
        assert_eq!(config.i2c_address(), I2cAddress::Secondary);
        assert_eq!(config.sample_rate(), SampleRate::LowPower);
        assert_eq!(config.voltage(), SupplyVoltage::Standard);
        assert_eq!(config.retention(), StateRetention::Short);
    }

    #[rstest]
    #[case(0x75)]
    #[case(0x78)]
    #[case(0)]
    fn rejects_unknown_addresses(#[case] value: u8) {
        let error = SensorConfig::new(RawSensorValues {
            i2c_address: value,
            ..raw()
        })
        .expect_err("address should be rejected");
        assert!(matches!(error, ConfigurationError::I2cAddress { value: v } if v == value));
    }

    #[rstest]
    #[case(10.5)]
    #[case(-10.01)]
    #[case(f64::NAN)]
    fn rejects_out_of_range_offsets(#[case] value: f64) {
        let error = SensorConfig::new(RawSensorValues {
            temp_offset: value,
            ..raw()
        })
        .expect_err("offset should be rejected");
        assert!(matches!(error, ConfigurationError::TemperatureOffset { .. }));
    }

    #[rstest]
    #[case(10.0)]
    #[case(-10.0)]
    #[case(-2.5)]
    fn accepts_offsets_within_bounds(#[case] value: f64) {
        let config = SensorConfig::new(RawSensorValues {
            temp_offset: value,
            ..raw()
        })
        .expect("offset should validate");
        assert!((config.temp_offset() - value).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(3, "LP", 3)]
    #[case(300, "ULP", 300)]
    fn maps_sample_rates_to_modes(#[case] value: u32, #[case] mode: &str, #[case] secs: u64) {
        let rate = SampleRate::try_from(value).expect("rate should validate");
        assert_eq!(rate.mode(), mode);
        assert_eq!(rate.interval(), Duration::from_secs(secs));
    }

    #[rstest]
    #[case(1.8, SupplyVoltage::Low)]
    #[case(3.3, SupplyVoltage::Standard)]
    fn parses_supported_voltages(#[case] value: f64, #[case] expected: SupplyVoltage) {
        assert_eq!(SupplyVoltage::parse(value).expect("voltage"), expected);
    }

    #[test]
    fn rejects_unsupported_voltage() {
        assert!(matches!(
            SupplyVoltage::parse(5.0),
            Err(ConfigurationError::Voltage { .. })
        ));
    }

    #[test]
    fn retention_maps_to_age() {
        assert_eq!(
            StateRetention::Long.max_age(),
            Duration::from_secs(28 * SECONDS_PER_DAY)
        );
        assert!(StateRetention::try_from(7).is_err());
    }
}
