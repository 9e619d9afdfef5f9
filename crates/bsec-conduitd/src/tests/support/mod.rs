//! Shared helpers for the daemon test suites.

mod fixtures;
mod publisher;
mod reporter;

pub use fixtures::{
    FixedProbe, ScriptToolchain, VENDOR_DIR, read_profile, sample_line, seed_vendor_sources,
    sensor_config, sensor_config_with, utf8, write_script,
};
pub use publisher::RecordingPublisher;
pub use reporter::{HealthEvent, RecordingHealthReporter};
