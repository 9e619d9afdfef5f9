//! Test suites for the conduit daemon.

pub(crate) mod support;
