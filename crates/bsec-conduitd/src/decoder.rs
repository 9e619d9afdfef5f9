//! Decoding of the fusion process's line-oriented JSON output.
//!
//! Every line is a self-contained JSON object. Numeric fields may arrive as
//! JSON numbers or as numeric strings; both are accepted. Lines that fail to
//! decode are logged and skipped, never fatal.

use std::fmt;
use std::io::{BufRead, ErrorKind};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

const DECODER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::decoder");

/// Confidence the fusion engine has in its IAQ estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IaqAccuracy {
    /// Sensor is still stabilising (level 0).
    Stabilizing,
    /// Low accuracy (level 1).
    Low,
    /// Medium accuracy (level 2).
    Medium,
    /// High accuracy (level 3).
    High,
}

impl IaqAccuracy {
    /// Maps the engine's numeric level; `None` outside `0..=3`.
    #[must_use]
    pub const fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(Self::Stabilizing),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    /// Descriptive label used in published readings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stabilizing => "Stabilizing",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for IaqAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decoded fusion sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Engine timestamp in nanoseconds.
    pub timestamp_ns: i64,
    /// IAQ index, `0..=500`.
    pub iaq: f64,
    /// Accuracy of `iaq`.
    pub accuracy: IaqAccuracy,
    /// Compensated temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Pressure in hPa.
    pub pressure: f64,
    /// Gas resistance in ohms.
    pub gas: f64,
    /// Engine status; `0` means healthy.
    pub status: i32,
}

/// Reasons a line was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line was not valid JSON.
    #[error("malformed JSON: {source}")]
    Syntax {
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The line was JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,
    /// A required field was absent.
    #[error("missing field '{field}'")]
    MissingField {
        /// Field name.
        field: &'static str,
    },
    /// A field had the wrong type or an unparsable value.
    #[error("field '{field}' has invalid value {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value as JSON text.
        value: String,
    },
    /// The accuracy level was outside `0..=3`.
    #[error("IAQ accuracy {value} is outside 0..=3")]
    Accuracy {
        /// Reported level.
        value: i64,
    },
}

/// Decodes a single output line.
pub fn decode_line(line: &str) -> Result<RawSample, DecodeError> {
    let value: Value =
        serde_json::from_str(line.trim()).map_err(|source| DecodeError::Syntax { source })?;
    let Value::Object(record) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let level = integer(&record, "IAQ_Accuracy")?;
    let accuracy = IaqAccuracy::from_level(level).ok_or(DecodeError::Accuracy { value: level })?;
    let status = integer(&record, "Status")?;
    let status = i32::try_from(status).map_err(|_| DecodeError::InvalidField {
        field: "Status",
        value: status.to_string(),
    })?;

    Ok(RawSample {
        timestamp_ns: integer(&record, "Timestamp")?,
        iaq: number(&record, "IAQ")?,
        accuracy,
        temperature: round_to(number(&record, "Temperature")?, 2),
        humidity: round_to(number(&record, "Humidity")?, 2),
        pressure: round_to(number(&record, "Pressure")?, 2),
        gas: number(&record, "Gas")?,
        status,
    })
}

/// Rounds half away from zero to `digits` decimal places.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    (value * scale).round() / scale
}

fn field<'a>(record: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, DecodeError> {
    record
        .get(name)
        .ok_or(DecodeError::MissingField { field: name })
}

fn invalid(name: &'static str, value: &Value) -> DecodeError {
    DecodeError::InvalidField {
        field: name,
        value: value.to_string(),
    }
}

fn number(record: &Map<String, Value>, name: &'static str) -> Result<f64, DecodeError> {
    let value = field(record, name)?;
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid(name, value))
}

fn integer(record: &Map<String, Value>, name: &'static str) -> Result<i64, DecodeError> {
    let value = field(record, name)?;
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(name, value))
}

/// Lazy sample stream over a reader, ending when the reader closes.
pub struct SampleDecoder<R> {
    reader: R,
    buffer: Vec<u8>,
    discarded: u64,
}

impl<R: BufRead> SampleDecoder<R> {
    /// Wraps a line-oriented reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            discarded: 0,
        }
    }

    /// Number of lines rejected so far.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl<R: BufRead> Iterator for SampleDecoder<R> {
    type Item = RawSample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    debug!(target: DECODER_TARGET, "fusion output closed");
                    return None;
                }
                Ok(_) => {}
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!(
                        target: DECODER_TARGET,
                        error = %error,
                        "reading fusion output failed; ending stream"
                    );
                    return None;
                }
            }

            let line = String::from_utf8_lossy(&self.buffer);
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(&line) {
                Ok(sample) => return Some(sample),
                Err(error) => {
                    self.discarded += 1;
                    warn!(
                        target: DECODER_TARGET,
                        error = %error,
                        line = %line.trim_end(),
                        "discarding undecodable fusion output"
                    );
                }
            }
        }
    }
}
