//! Global Configuration (~/.lockstep/config.toml)
//!
//! Handles user-level configuration stored in `~/.lockstep/config.toml`.

use crate::sources::{validate_sources, PackageSource};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.lockstep/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Machine-wide package sources
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PackageSource>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Default local content cache root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages_path: Option<PathBuf>,

    /// Default parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from a file
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

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if defaults.max_parallelism == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "defaults.max_parallelism".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        validate_sources(&self.sources)
    }

    /// Get the global config file path (~/.lockstep/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lockstep").join("config.toml"))
    }

    /// Default content cache root (~/.lockstep/packages)
    pub fn default_packages_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lockstep").join("packages"))
    }

    pub fn packages_path(&self) -> Option<&Path> {
        self.defaults
            .as_ref()
            .and_then(|d| d.packages_path.as_deref())
    }

    pub fn max_parallelism(&self) -> Option<usize> {
        self.defaults.as_ref().and_then(|d| d.max_parallelism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_global_config() {
        let toml = r#"
[defaults]
packages_path = "/home/dev/.pkgs"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.packages_path(), Some(Path::new("/home/dev/.pkgs")));
    }

    #[test]
    fn test_parse_sources() {
        let toml = r#"
[[sources]]
name = "public"
url = "https://feed.example/v3/index.json"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].enabled);
    }

    #[test]
    fn test_invalid_parallelism() {
        let config = GlobalConfig {
            defaults: Some(DefaultsConfig {
                max_parallelism: Some(0),
                packages_path: None,
            }),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
