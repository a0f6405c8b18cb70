//! # Cherry Common
//!
//! Error types, logging setup and configuration shared by the Cherry crates.
//!
//! ## Features
//!
//! - Unified error type for configuration and I/O failures
//! - Logging configuration and setup
//! - Event registry configuration

use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::EventsConfig;
pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for Cherry.
#[derive(Error, Debug)]
pub enum CherryError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CherryError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CherryError::Config { .. } => "config",
            CherryError::Json(_) => "json",
            CherryError::Io(_) => "io",
        }
    }
}

/// Result type alias for Cherry operations.
pub type Result<T> = std::result::Result<T, CherryError>;
