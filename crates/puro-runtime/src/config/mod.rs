//! Configuration module for the Puro runtime.
//!
//! Provides layered configuration loading (TOML files, environment
//! variables, programmatic overrides) for the server, logging, and
//! per-plugin settings.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{LogFormat, LogLevel, LogOutput, LoggingConfig, PuroConfig, ServerConfig};
