//! Daemon process lifecycle: singleton guard, signal forwarding and launch.

mod errors;
mod guard;
mod launch;
mod signals;

pub use errors::LaunchError;
pub use guard::ProcessPaths;
pub use launch::{LaunchPlan, SignalMode, run_daemon, run_daemon_with};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
