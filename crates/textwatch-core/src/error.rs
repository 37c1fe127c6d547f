//! Application-level error types for Textwatch.
//!
//! Domain crates keep their own error enums; this module holds what the
//! companion process itself can fail on during startup:
//! - Configuration loading and validation
//! - Service construction (HTTP client, capabilities)
//! - I/O on the host channel

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a short message suitable for the console.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Weather or location service could not be set up.
    #[error("Service error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create a service error from any displayable error.
    pub fn service(err: impl std::fmt::Display) -> Self {
        AppError::Service(err.to_string())
    }

    /// Returns a user-friendly message.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Service(_) => "The weather service could not be started.",
            AppError::Io(_) => "Lost the connection to the device host.",
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    NoConfigDir,

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NoConfigDir => "No configuration directory available. Pass a config path.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Io(_) => "Configuration file could not be read or written.",
        }
    }
}
