//! Runtime configuration for synchronization and logging.
//!
//! Both structs deserialize from JSON (or any serde format) with every field
//! optional, so embedding applications can keep them inside their own config.

use serde::Deserialize;
use std::path::PathBuf;

/// Default name of the ordinal column on related and join tables.
pub const DEFAULT_POSITION_COLUMN: &str = "position";

/// Knobs consumed by the synchronizers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Column that receives the zero-based list index on full-list writes,
    /// when the target table declares it.
    pub position_column: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            position_column: DEFAULT_POSITION_COLUMN.to_string(),
        }
    }
}

impl SyncConfig {
    /// Parses a config from JSON text, filling omitted fields with defaults.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

/// File logging settings passed to [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`, case-insensitive.
    #[serde(default = "default_level_string")]
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    /// Builds a config using the build-mode default level.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: default_level_string(),
            log_dir: log_dir.into(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

fn default_level_string() -> String {
    crate::logging::default_log_level().to_string()
}
