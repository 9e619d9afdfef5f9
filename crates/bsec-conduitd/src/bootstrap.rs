//! Conduit bootstrap: configuration, telemetry and settings validation.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use bsec_conduit_config::{Config, ConduitSettings, ConfigurationError};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a pre-built configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A configuration value is outside its supported domain.
    #[error("invalid configuration: {source}")]
    Settings {
        /// Validation failure.
        #[source]
        source: ConfigurationError,
    },
}

/// Result of a successful bootstrap invocation.
#[derive(Debug)]
pub struct Bootstrapped {
    config: Config,
    settings: ConduitSettings,
    telemetry: TelemetryHandle,
}

impl Bootstrapped {
    /// Configuration as loaded.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validated settings.
    #[must_use]
    pub fn settings(&self) -> &ConduitSettings {
        &self.settings
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Loads configuration, installs telemetry and validates settings.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<Bootstrapped, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let settings = match ConduitSettings::from_config(&config) {
        Ok(settings) => settings,
        Err(source) => {
            let error = BootstrapError::Settings { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&settings);
    Ok(Bootstrapped {
        config,
        settings,
        telemetry,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::tests::support::{HealthEvent, RecordingHealthReporter, utf8};

    fn config_in(dir: &tempfile::TempDir, config: Config) -> Config {
        Config {
            log_filter: "warn".to_owned(),
            base_dir: utf8(dir.path()),
            ..config
        }
    }

    struct FailingLoader;

    impl ConfigLoader for FailingLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter(["bsec-conduitd", "--sample-rate", "often"])
        }
    }

    #[test]
    fn valid_configuration_bootstraps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reporter = RecordingHealthReporter::default();
        let config = config_in(&dir, Config::default());

        let bootstrapped =
            bootstrap_with(&StaticConfigLoader::new(config), &reporter).expect("bootstrap");

        assert_eq!(bootstrapped.config().report_interval, 60);
        assert_eq!(bootstrapped.settings().window_capacity(), 40);
        assert_eq!(
            reporter.events(),
            [HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
        );
    }

    #[test]
    fn loader_failures_are_reported() {
        let reporter = RecordingHealthReporter::default();

        let error = bootstrap_with(&FailingLoader, &reporter).expect_err("loader fails");

        assert!(matches!(error, BootstrapError::Configuration { .. }));
        assert!(matches!(
            reporter.events().last(),
            Some(HealthEvent::BootstrapFailed(_))
        ));
    }

    #[rstest]
    #[case::sample_rate(Config { sample_rate: 60, ..Config::default() })]
    #[case::voltage(Config { voltage: 5.0, ..Config::default() })]
    #[case::i2c_address(Config { i2c_address: 0x42, ..Config::default() })]
    fn unsupported_values_fail_validation(#[case] config: Config) {
        let dir = tempfile::tempdir().expect("tempdir");
        let reporter = RecordingHealthReporter::default();
        let config = config_in(&dir, config);

        let error =
            bootstrap_with(&StaticConfigLoader::new(config), &reporter).expect_err("invalid");

        assert!(matches!(error, BootstrapError::Settings { .. }));
        assert_eq!(reporter.events().len(), 2);
    }
}
