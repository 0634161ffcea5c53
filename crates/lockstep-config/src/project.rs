//! Project Configuration (lockstep.toml)
//!
//! Handles restore configuration stored in `lockstep.toml` at the solution root.

use crate::logging::LoggingConfig;
use crate::sources::{validate_sources, PackageSource, SourceSelection};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from lockstep.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Restore behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreConfig>,

    /// Package sources, in priority order
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PackageSource>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// `[restore]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RestoreConfig {
    /// Local content cache root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages_path: Option<PathBuf>,

    /// Upper bound on concurrently resolving projects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<usize>,

    /// Multi-source version merge policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_selection: Option<SourceSelection>,

    /// Treat every project as enforce-locked regardless of its own policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_locked_mode: Option<bool>,

    /// Ignore globally configured sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_global_sources: Option<bool>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(restore) = &self.restore {
            if restore.max_parallelism == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "restore.max_parallelism".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if let Some(path) = &restore.packages_path {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "restore.packages_path".to_string(),
                        reason: "path cannot be empty".to_string(),
                    });
                }
            }
        }

        validate_sources(&self.sources)?;

        if let Some(logging) = &self.logging {
            logging.validate()?;
        }

        Ok(())
    }

    /// Whether the project asked to drop global sources
    pub fn clears_global_sources(&self) -> bool {
        self.restore
            .as_ref()
            .and_then(|r| r.clear_global_sources)
            .unwrap_or(false)
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if let Some(other_restore) = &other.restore {
            let restore = self.restore.get_or_insert_with(Default::default);
            if other_restore.packages_path.is_some() {
                restore.packages_path = other_restore.packages_path.clone();
            }
            if other_restore.max_parallelism.is_some() {
                restore.max_parallelism = other_restore.max_parallelism;
            }
            if other_restore.source_selection.is_some() {
                restore.source_selection = other_restore.source_selection;
            }
            if other_restore.force_locked_mode.is_some() {
                restore.force_locked_mode = other_restore.force_locked_mode;
            }
            if other_restore.clear_global_sources.is_some() {
                restore.clear_global_sources = other_restore.clear_global_sources;
            }
        }
        if !other.sources.is_empty() {
            self.sources = crate::sources::merge_sources(&self.sources, &other.sources);
        }
        if other.logging.is_some() {
            self.logging = other.logging.clone();
        }
    }
}
