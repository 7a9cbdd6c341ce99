//! Configuration module for the Chime runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging, dispatch behavior and bot verification records.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotsConfig, ChimeConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
