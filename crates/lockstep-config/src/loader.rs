//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::logging::LoggingConfig;
use crate::project::{ProjectConfig, RestoreConfig};
use crate::sources::{merge_sources, PackageSource, SourceSelection};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project config file name
pub const CONFIG_FILE_NAME: &str = "lockstep.toml";

const DEFAULT_PARALLELISM: usize = 4;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.lockstep/config.toml) - lowest priority
/// 2. Project config (./lockstep.toml) - overrides global
/// 3. Environment variables (LOCKSTEP_*) - overrides project
/// 4. Caller settings - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Directory where lockstep.toml was found
    pub project_root: Option<PathBuf>,
}

/// Effective settings consumed by a restore run
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSettings {
    /// Local content cache root
    pub packages_path: PathBuf,
    /// Bounded parallelism for project resolution
    pub max_parallelism: usize,
    /// Ordered package sources (disabled ones already removed)
    pub sources: Vec<PackageSource>,
    /// Multi-source merge policy
    pub source_selection: SourceSelection,
    /// Force enforce-locked for every project
    pub force_locked_mode: bool,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RestoreSettings {
    /// Settings with defaults for everything except the cache root
    pub fn new(packages_path: impl Into<PathBuf>) -> Self {
        Self {
            packages_path: packages_path.into(),
            max_parallelism: DEFAULT_PARALLELISM,
            sources: Vec::new(),
            source_selection: SourceSelection::default(),
            force_locked_mode: false,
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<PackageSource>) -> Self {
        self.sources = sources.into_iter().filter(|s| s.enabled).collect();
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_source_selection(mut self, selection: SourceSelection) -> Self {
        self.source_selection = selection;
        self
    }

    pub fn with_force_locked_mode(mut self, force: bool) -> Self {
        self.force_locked_mode = force;
        self
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config path instead of ~/.lockstep/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find lockstep.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        // A missing home directory only means there is no global layer
        let global_config = match self.load_global_config() {
            Ok(config) => config,
            Err(ConfigError::HomeNotFound) => GlobalConfig::default(),
            Err(e) => return Err(e),
        };

        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = match self.load_global_config() {
            Ok(config) => config,
            Err(ConfigError::HomeNotFound) => GlobalConfig::default(),
            Err(e) => return Err(e),
        };
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); a default config when none is found
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.lockstep/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: LOCKSTEP_PACKAGES_PATH, LOCKSTEP_MAX_PARALLELISM, LOCKSTEP_LOCKED_MODE
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(path) = env::var("LOCKSTEP_PACKAGES_PATH") {
            if !path.is_empty() {
                restore_section(&mut config).packages_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(value) = env::var("LOCKSTEP_MAX_PARALLELISM") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "LOCKSTEP_MAX_PARALLELISM".to_string(),
                    reason: format!("expected a positive integer, got '{}'", value),
                })?;
            restore_section(&mut config).max_parallelism = Some(parsed);
        }

        if let Ok(locked) = env::var("LOCKSTEP_LOCKED_MODE") {
            let locked_bool = matches!(locked.to_lowercase().as_str(), "true" | "1" | "yes");
            restore_section(&mut config).force_locked_mode = Some(locked_bool);
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.lockstep)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lockstep"))
    }
}

fn restore_section(config: &mut ProjectConfig) -> &mut RestoreConfig {
    config.restore.get_or_insert_with(Default::default)
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a lockstep.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Effective ordered source list (project > global), disabled sources removed
    pub fn sources(&self) -> Vec<PackageSource> {
        let base: &[PackageSource] = if self.project.clears_global_sources() {
            &[]
        } else {
            &self.global.sources
        };
        merge_sources(base, &self.project.sources)
            .into_iter()
            .filter(|s| s.enabled)
            .collect()
    }

    /// Resolve the effective restore settings (project > global > default)
    pub fn restore_settings(&self) -> RestoreSettings {
        let restore = self.project.restore.clone().unwrap_or_default();

        let packages_path = restore
            .packages_path
            .or_else(|| self.global.packages_path().map(Path::to_path_buf))
            .or_else(|| GlobalConfig::default_packages_path().ok())
            .unwrap_or_else(|| PathBuf::from(".lockstep").join("packages"));

        let max_parallelism = restore
            .max_parallelism
            .or_else(|| self.global.max_parallelism())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(DEFAULT_PARALLELISM)
            });

        RestoreSettings {
            packages_path,
            max_parallelism,
            sources: self.sources(),
            source_selection: restore.source_selection.unwrap_or_default(),
            force_locked_mode: restore.force_locked_mode.unwrap_or(false),
            logging: self.project.logging.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::with_global_config_path(dir.join("no-global.toml"))
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[restore]
max_parallelism = 3
"#,
        );

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert!(config.is_project());
        assert_eq!(config.restore_settings().max_parallelism, 3);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        let sub_dir = temp_dir.path().join("src").join("app");
        fs::create_dir_all(&sub_dir).unwrap();

        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_env_override_parallelism() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[restore]
max_parallelism = 2
"#,
        );

        env::set_var("LOCKSTEP_MAX_PARALLELISM", "12");
        let mut loader = isolated_loader(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path());
        env::remove_var("LOCKSTEP_MAX_PARALLELISM");

        assert_eq!(config.unwrap().restore_settings().max_parallelism, 12);
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        env::set_var("LOCKSTEP_MAX_PARALLELISM", "many");
        let mut loader = isolated_loader(temp_dir.path());
        let result = loader.load_from_directory(temp_dir.path());
        env::remove_var("LOCKSTEP_MAX_PARALLELISM");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_disabled_sources_dropped() {
        let config = Config {
            project: ProjectConfig {
                sources: vec![
                    PackageSource::new("a", "https://a"),
                    PackageSource {
                        enabled: false,
                        ..PackageSource::new("b", "https://b")
                    },
                ],
                ..Default::default()
            },
            global: GlobalConfig::default(),
            project_root: None,
        };

        let names: Vec<_> = config.sources().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_settings_builder_clamps_parallelism() {
        let settings = RestoreSettings::new("/tmp/pkgs").with_max_parallelism(0);
        assert_eq!(settings.max_parallelism, 1);
    }
}
