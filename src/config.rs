//! Worker configuration.
//!
//! Process-wide settings for the QA training worker: the admission cap, the
//! default model list, lease staleness and the retry and timeout knobs of
//! the pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the QA training worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of tasks this process keeps checked out at once.
    pub max_concurrency: usize,
    /// Models to fall back to when a task names none; the first one is used.
    pub default_models: Vec<String>,
    /// Age after which a lease is considered abandoned.
    pub stale_lease_after: Duration,
    /// Pause before the loop is re-entered after a transient failure.
    pub retry_delay: Duration,
    /// Timeout for a single completion call.
    pub model_timeout: Duration,
    /// Sampling temperature for QA extraction.
    pub temperature: f64,
    /// Chunk length cap used when the model answer has no Q/A blocks.
    pub fallback_chunk_len: usize,
    /// How often an idle supervisor re-checks the queue on its own.
    pub idle_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            default_models: vec!["gpt-3.5-turbo-16k".to_string()],
            stale_lease_after: Duration::from_secs(10 * 60),
            retry_delay: Duration::from_secs(1),
            model_timeout: Duration::from_secs(600),
            temperature: 0.01,
            fallback_chunk_len: 500,
            idle_poll_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QA_MAX_CONCURRENCY`: Admission cap (default: 10)
    /// - `QA_DEFAULT_MODELS`: Comma-separated default models (default: gpt-3.5-turbo-16k)
    /// - `QA_STALE_LEASE_SECS`: Lease staleness threshold (default: 600)
    /// - `QA_RETRY_DELAY_MS`: Delay after a transient failure (default: 1000)
    /// - `QA_MODEL_TIMEOUT_SECS`: Completion timeout (default: 600)
    /// - `QA_TEMPERATURE`: Sampling temperature (default: 0.01)
    /// - `QA_FALLBACK_CHUNK_LEN`: Fallback chunk length (default: 500)
    /// - `QA_IDLE_POLL_SECS`: Idle re-check interval (default: 30)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QA_MAX_CONCURRENCY") {
            config.max_concurrency = parse_env_value(&val, "QA_MAX_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("QA_DEFAULT_MODELS") {
            config.default_models = parse_model_list(&val);
        }

        if let Ok(val) = std::env::var("QA_STALE_LEASE_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_STALE_LEASE_SECS")?;
            config.stale_lease_after = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("QA_RETRY_DELAY_MS") {
            let millis: u64 = parse_env_value(&val, "QA_RETRY_DELAY_MS")?;
            config.retry_delay = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("QA_MODEL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_MODEL_TIMEOUT_SECS")?;
            config.model_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("QA_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "QA_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("QA_FALLBACK_CHUNK_LEN") {
            config.fallback_chunk_len = parse_env_value(&val, "QA_FALLBACK_CHUNK_LEN")?;
        }

        if let Ok(val) = std::env::var("QA_IDLE_POLL_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_IDLE_POLL_SECS")?;
            config.idle_poll_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.default_models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "default_models must contain at least one model".to_string(),
            ));
        }

        if self.stale_lease_after.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "stale_lease_after must be greater than 0".to_string(),
            ));
        }

        if self.model_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "model_timeout must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.fallback_chunk_len == 0 {
            return Err(ConfigError::ValidationFailed(
                "fallback_chunk_len must be greater than 0".to_string(),
            ));
        }

        if self.idle_poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "idle_poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The model used when a task does not name one.
    pub fn fallback_model(&self) -> Option<&str> {
        self.default_models
            .iter()
            .map(|m| m.trim())
            .find(|m| !m.is_empty())
    }

    /// Builder method to set the admission cap.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder method to set the default models.
    pub fn with_default_models(mut self, models: Vec<String>) -> Self {
        self.default_models = models;
        self
    }

    /// Builder method to set the lease staleness threshold.
    pub fn with_stale_lease_after(mut self, after: Duration) -> Self {
        self.stale_lease_after = after;
        self
    }

    /// Builder method to set the transient retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Builder method to set the completion timeout.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set the fallback chunk length.
    pub fn with_fallback_chunk_len(mut self, len: usize) -> Self {
        self.fallback_chunk_len = len;
        self
    }

    /// Builder method to set the idle poll interval.
    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

fn parse_model_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
