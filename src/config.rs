//! Engine configuration
//!
//! [`FeeguardConfig::load`] reads `config/config.toml` when present and
//! overlays environment variables prefixed with `FEEGUARD` (nested keys are
//! separated by `__`, e.g. `FEEGUARD__ENGINE__MAX_GENERATION_MONTHS=60`).

use crate::fees::DEFAULT_MAX_GENERATION_MONTHS;
use crate::model::{CourseFee, CourseFeeTable};
use config::{Config, ConfigError, Environment, File};
use log::warn;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
const ENV_PREFIX: &str = "FEEGUARD";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeeguardConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Rows of the course fee table
    #[serde(default)]
    pub courses: Vec<CourseFee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_generation_months")]
    pub max_generation_months: u32,
    #[serde(default = "default_admin_email")]
    pub acting_admin_email: String,
    #[serde(default = "default_admin_name")]
    pub acting_admin_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_generation_months: default_max_generation_months(),
            acting_admin_email: default_admin_email(),
            acting_admin_name: default_admin_name(),
        }
    }
}

fn default_max_generation_months() -> u32 {
    DEFAULT_MAX_GENERATION_MONTHS
}

fn default_admin_email() -> String {
    "admin@feeguard.local".to_string()
}

fn default_admin_name() -> String {
    "System Administrator".to_string()
}

impl FeeguardConfig {
    /// Load from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from an explicit file path, overlaid by env vars.
    ///
    /// A missing file is not an error. A file that exists but cannot be
    /// parsed is logged and the environment alone is used.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if path.exists() {
                    warn!(
                        "failed to load config file {}, falling back to env: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        settings.try_deserialize::<FeeguardConfig>().map_err(|e| {
            ConfigError::Message(format!("Feeguard configuration could not be loaded: {e}"))
        })
    }

    #[must_use]
    pub fn course_table(&self) -> CourseFeeTable {
        CourseFeeTable::new(self.courses.clone())
    }
}
