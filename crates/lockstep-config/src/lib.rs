//! Lockstep configuration system
//!
//! Provides the settings a restore run needs:
//! - Project configuration (lockstep.toml)
//! - Global user configuration (~/.lockstep/config.toml)
//! - Package source lists
//! - Logging bootstrap
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.lockstep/config.toml)
//! 2. Project config (./lockstep.toml)
//! 3. Environment variables (LOCKSTEP_*)
//! 4. Explicit settings from the caller
//!
//! # Example
//!
//! ```no_run
//! use lockstep_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let settings = config.restore_settings();
//! ```

pub mod global;
pub mod loader;
pub mod logging;
pub mod project;
pub mod sources;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Duplicate package source name: {0}")]
    DuplicateSource(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader, RestoreSettings};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use project::ProjectConfig;
pub use sources::{PackageSource, SourceSelection};
