//! Configuration loading for the Podwise retrieval engine.
//!
//! Supports loading configuration from:
//! - YAML files
//! - Environment variables (`PODWISE_` prefix)
//! - Runtime overrides (`Settings::merge`)

pub mod settings;

pub use settings::{
    CascadeThresholds, IngestConfig, Settings, TimeoutConfig, load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for podwise_core::Error {
    fn from(err: ConfigError) -> Self {
        podwise_core::Error::config(err.to_string())
    }
}
