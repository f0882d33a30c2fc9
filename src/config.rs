//! Application configuration.
//!
//! Sectioned configuration with environment variable overrides and
//! sensible defaults. All values are read once at startup and treated as
//! read-only afterwards.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

use crate::constants::DEFAULT_EXPANSION_COOLDOWN;
use crate::constants::DEFAULT_EXPANSION_MIN_WAIT;
use crate::constants::DEFAULT_INITIAL_POOL_SIZE;
use crate::constants::DEFAULT_MAX_POOL_SIZE;

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// An environment override could not be parsed.
    #[snafu(display("invalid value '{value}' for {key}: {reason}"))]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required setting was not provided.
    #[snafu(display("missing required setting {key}"))]
    MissingValue {
        /// Environment variable name.
        key: String,
    },
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Secrets for sealed values.
    #[serde(default)]
    pub sealing: SealingConfig,
    /// Connection worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load all sections from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            sealing: SealingConfig::load()?,
            worker: WorkerConfig::load()?,
        })
    }
}

/// Secrets used to derive sealing keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SealingConfig {
    /// The application secret. Sealing keys are derived from it, never
    /// used raw.
    pub secret_key: String,
    /// Dedicated sealing secret; when set it takes precedence over
    /// `secret_key` for sealed values.
    #[serde(default)]
    pub sealed_value_secret_key: Option<String>,
    /// Retired secrets kept for rotation; values sealed under them remain
    /// readable until re-sealed.
    #[serde(default)]
    pub retired_secret_keys: Vec<String>,
}

impl SealingConfig {
    /// Load sealing configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("NOTIFY_SECRET_KEY")
            .map_err(|_| ConfigError::MissingValue { key: "NOTIFY_SECRET_KEY".to_string() })?;

        Ok(Self {
            secret_key,
            sealed_value_secret_key: std::env::var("NOTIFY_SEALED_VALUE_SECRET_KEY").ok(),
            retired_secret_keys: std::env::var("NOTIFY_RETIRED_SECRET_KEYS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// Connection worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Address the worker listens on.
    pub bind_addr: String,
    /// Number of connection slots at startup.
    pub initial_pool_size: usize,
    /// Hard ceiling on connection slots; capacity never grows past this.
    pub max_pool_size: usize,
    /// Minimum elapsed time between successive pool expansions, in
    /// milliseconds.
    pub expansion_cooldown_ms: u64,
    /// Lower bound on the pre-accept wait, in milliseconds.
    pub expansion_min_wait_ms: u64,
}

impl WorkerConfig {
    /// Load worker configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to existing configuration.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("WORKER_BIND_ADDR") {
            self.bind_addr = val;
        }
        if let Ok(val) = std::env::var("WORKER_INITIAL_POOL_SIZE") {
            self.initial_pool_size = parse_env("WORKER_INITIAL_POOL_SIZE", &val)?;
        }
        if let Ok(val) = std::env::var("WORKER_MAX_POOL_SIZE") {
            self.max_pool_size = parse_env("WORKER_MAX_POOL_SIZE", &val)?;
        }
        if let Ok(val) = std::env::var("WORKER_EXPANSION_COOLDOWN_MS") {
            self.expansion_cooldown_ms = parse_env("WORKER_EXPANSION_COOLDOWN_MS", &val)?;
        }
        if let Ok(val) = std::env::var("WORKER_EXPANSION_MIN_WAIT_MS") {
            self.expansion_min_wait_ms = parse_env("WORKER_EXPANSION_MIN_WAIT_MS", &val)?;
        }
        Ok(())
    }

    /// Expansion cooldown as a duration.
    pub fn expansion_cooldown(&self) -> Duration {
        Duration::from_millis(self.expansion_cooldown_ms)
    }

    /// Minimum pre-accept wait as a duration.
    pub fn expansion_min_wait(&self) -> Duration {
        Duration::from_millis(self.expansion_min_wait_ms)
    }

    // Default value functions
    fn default_bind_addr() -> String {
        "0.0.0.0:8080".to_string()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            initial_pool_size: DEFAULT_INITIAL_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            expansion_cooldown_ms: DEFAULT_EXPANSION_COOLDOWN.as_millis() as u64,
            expansion_min_wait_ms: DEFAULT_EXPANSION_MIN_WAIT.as_millis() as u64,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
