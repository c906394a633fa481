//! Configuration management for the interceptors.
//!
//! Settings are loaded from configuration files and environment variables
//! and then handed to the interceptor constructors.
//!
//! ## Example Configuration
//!
//! ```toml
//! [logging]
//! log_started = true
//! log_completed = true
//! started_message = "{method} started"
//!
//! [timeout]
//! default_timeout_ms = 5000
//!
//! [telemetry]
//! json_logging = true
//! log_level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix, e.g. `GRPC_INTERCEPTORS__TIMEOUT__DEFAULT_TIMEOUT_MS=0`.
pub const ENV_PREFIX: &str = "GRPC_INTERCEPTORS";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterceptorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Logging interceptor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log a record before each call
    #[serde(default)]
    pub log_started: bool,

    /// Log a record after each successful call (failures are always logged)
    #[serde(default = "default_true")]
    pub log_completed: bool,

    /// Template for the start record; `{method}` is replaced by the method name
    #[serde(default = "default_started_message")]
    pub started_message: String,

    /// Template for the completion record
    #[serde(default = "default_completed_message")]
    pub completed_message: String,

    /// Template for the completion record of failed calls
    #[serde(default = "default_completed_error_message")]
    pub completed_error_message: String,
}

/// Deadline interceptor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline applied to calls that arrive without one; 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default)]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_started_message() -> String {
    "{method} started".to_string()
}

fn default_completed_message() -> String {
    "{method} completed".to_string()
}

fn default_completed_error_message() -> String {
    "{method} completed with error".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_service_name() -> String {
    "grpc-interceptors".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_started: false,
            log_completed: default_true(),
            started_message: default_started_message(),
            completed_message: default_completed_message(),
            completed_error_message: default_completed_error_message(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: false,
            log_level: default_log_level(),
        }
    }
}

impl InterceptorConfig {
    /// Load configuration from configuration files and environment variables.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from APP_ENV)
    /// 4. Environment variables (prefixed with GRPC_INTERCEPTORS)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use grpc_interceptors_common::config::InterceptorConfig;
    ///
    /// let config = InterceptorConfig::load().expect("Failed to load configuration");
    /// println!("Default timeout: {:?}", config.timeout.default_timeout());
    /// ```
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Example: GRPC_INTERCEPTORS__LOGGING__LOG_STARTED=true
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let parsed: InterceptorConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.started_message.trim().is_empty() {
            anyhow::bail!("logging.started_message must not be empty");
        }

        if self.logging.completed_message.trim().is_empty() {
            anyhow::bail!("logging.completed_message must not be empty");
        }

        if self.logging.completed_error_message.trim().is_empty() {
            anyhow::bail!("logging.completed_error_message must not be empty");
        }

        if self.telemetry.service_name.is_empty() {
            anyhow::bail!("telemetry.service_name must not be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_levels.join(", ")
            );
        }

        Ok(())
    }
}
