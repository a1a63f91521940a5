//! Configuration Loader
//!
//! Layers the built-in defaults, an optional TOML or YAML file and `RESILIENCE_*`
//! environment variables, then deserialises and validates the result.
//!
//! Nested keys in environment variables are separated by `__`, for example
//! `RESILIENCE_CIRCUIT_BREAKERS__DEFAULT_CONFIG__FAILURE_THRESHOLD=7`.

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use config::{Config, Environment, File};
use std::path::PathBuf;
use tracing::{debug, info};

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "RESILIENCE";

/// Builder-style loader for [`ResilienceConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    file_required: bool,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Layer a configuration file if it exists; the format follows the extension
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.file_required = false;
        self
    }

    /// Layer a configuration file that must exist
    pub fn with_required_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.file_required = true;
        self
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load, deserialise and validate the configuration
    pub fn load(&self) -> ConfigResult<ResilienceConfig> {
        let config = self.load_unvalidated()?;
        config.validate()?;

        info!(
            file = ?self.file,
            auto_remediation = config.auto_remediation,
            health_checks = config.health.checks.len(),
            default_breakers = config.circuit_breakers.default_breakers.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load and deserialise without validating, for tooling that reports every problem
    pub fn load_unvalidated(&self) -> ConfigResult<ResilienceConfig> {
        if let Some(path) = &self.file {
            if self.file_required && !path.exists() {
                return Err(ConfigurationError::config_file_not_found(path.clone()));
            }
        }

        let mut builder =
            Config::builder().add_source(Config::try_from(&ResilienceConfig::default())?);

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Layering configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(self.file_required));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
