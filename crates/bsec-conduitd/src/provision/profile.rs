//! Calibration profile naming.

use std::fmt;

use bsec_conduit_config::{SampleRate, StateRetention, SupplyVoltage};

/// Name of a vendor calibration profile, e.g. `generic_33v_3s_4d`.
///
/// The vendor ships one profile per combination of supply voltage, sample
/// interval and retention period; the name is a pure function of those three.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileId(String);

impl ProfileId {
    /// Derives the identifier for a hardware combination.
    #[must_use]
    pub fn derive(voltage: SupplyVoltage, rate: SampleRate, retention: StateRetention) -> Self {
        Self(format!(
            "generic_{}v_{}s_{}d",
            voltage.profile_tag(),
            rate.seconds(),
            retention.days()
        ))
    }

    /// The identifier as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
