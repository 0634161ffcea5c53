//! Logging bootstrap
//!
//! Library crates only emit `tracing` events. Hosts call [`init_tracing`] once
//! to install a subscriber; `LOCKSTEP_LOG` (an `EnvFilter` directive) takes
//! precedence over the configured level.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive, e.g. `lockstep_core=debug`
pub const LOG_ENV: &str = "LOCKSTEP_LOG";

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level when `LOCKSTEP_LOG` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(level) = &self.level {
            if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    reason: format!("unknown level '{}'", level),
                });
            }
        }
        Ok(())
    }

    /// Effective level, `info` when unset
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.level()))
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> ConfigResult<()> {
    config.validate()?;
    let builder = tracing_subscriber::fmt().with_env_filter(config.filter());

    let result = match config.format.unwrap_or_default() {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
