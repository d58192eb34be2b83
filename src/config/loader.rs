//! Configuration Loader
//!
//! Environment-aware layered loading built on the `config` crate. Sources in
//! increasing precedence:
//!
//! 1. built-in defaults ([`AutomationConfig::default`])
//! 2. `<config_dir>/autopromptr.toml` (optional)
//! 3. `<config_dir>/autopromptr.<environment>.toml` (optional)
//! 4. `AUTOPROMPTR__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::AutomationConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "autopromptr";
const ENV_PREFIX: &str = "AUTOPROMPTR";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: AutomationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without touching global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layered(&config_directory, environment)?;
        config.validate()?;

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            backends = config.backends.len(),
            failure_threshold = config.circuit_breakers.failure_threshold,
            max_concurrency = config.queue.max_concurrency,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding callers)
    pub fn from_config(config: AutomationConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Configuration as JSON with sensitive-looking fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: AUTOPROMPTR_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("AUTOPROMPTR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn load_layered(config_directory: &Path, environment: &str) -> ConfigResult<AutomationConfig> {
        let defaults = Config::try_from(&AutomationConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        for path in [&base_file, &env_file] {
            if path.exists() {
                debug!("Found configuration file: {}", path.display());
            }
        }

        let layered = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file.clone()).required(false))
            .add_source(File::from(env_file.clone()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        layered
            .try_deserialize::<AutomationConfig>()
            .map_err(ConfigurationError::deserialize_error)
    }

    fn sanitize_config_for_logging(config: &AutomationConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential", "auth"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
