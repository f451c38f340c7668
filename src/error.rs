//! Error types for the Storefront service.

use thiserror::Error;

/// Main error type for Storefront operations.
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while reading or merging configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for Storefront operations.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// The one outcome the rate limit gate can produce besides admission.
///
/// Carries the number of seconds the client should wait before retrying.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Too many requests. Please try again later.")]
pub struct RateLimitExceeded {
    /// Seconds until the client's current window resets
    pub retry_after_secs: u64,
}
