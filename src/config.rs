//! Configuration management for Storefront.
//!
//! Values are layered from built-in defaults, an optional YAML file and
//! `STOREFRONT__`-prefixed environment variables, in increasing precedence.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, StorefrontError};
use crate::ratelimit::RateLimitSettings;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "STOREFRONT";
/// Separator between nested keys in environment variable names.
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Storefront service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorefrontConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Take the client identity from `X-Forwarded-For` when behind a proxy
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    /// Counting window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests admitted per client per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Seconds between sweeps of expired windows
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl RateLimitingConfig {
    /// Validate and convert into gate settings.
    pub fn settings(&self) -> Result<RateLimitSettings> {
        if self.window_secs == 0 {
            return Err(StorefrontError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(StorefrontError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(StorefrontError::Config(
                "rate_limiting.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(RateLimitSettings {
            window: Duration::from_secs(self.window_secs),
            max_requests: self.max_requests,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StorefrontConfig {
    /// Load configuration from an optional file plus environment overrides.
    ///
    /// A missing file is not an error; defaults fill any gap.
    pub fn load(path: &Path) -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        let config: StorefrontConfig = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.settings().map(|_| ())
    }
}
