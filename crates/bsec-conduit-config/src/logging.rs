use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for journald or a log shipper.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Presentation of the averaged IAQ index in published readings.
///
/// `Percent` rescales the 0–500 index onto 0–100 and publishes whole
/// numbers, giving up one decimal digit of precision compared with `Raw`.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IaqDisplay {
    /// The fusion engine's index, rounded to one decimal place.
    #[default]
    Raw,
    /// The index rescaled to a percentage, rounded to a whole number.
    Percent,
}
