//! SPQF operator configuration file handling
//!
//! Operator settings only: where the database lives and how much gets
//! logged. Per-channel vote rules (quorum, plurality, enfranchisement, ...)
//! are config documents in the database and are edited with `spqf config`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// SPQF operator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpqfConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding documents.json, pending.json and archive.json
    #[serde(default = "default_db_dir")]
    pub db_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_dir: default_db_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl SpqfConfig {
    pub fn new(db_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig { db_dir },
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: SpqfConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path` if given, else the default config file if it exists, else
    /// built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(db_dir: &Path) -> String {
        format!(
            r#"# SPQF Configuration (Operator Settings)
#
# Vote rules (quorum, plurality, enfranchisement, durations) are NOT set
# here. They live in each channel's config document under "config.vote"
# and are changed with `spqf config <channel> <key> = <value>` or by vote.

[storage]
# Directory for documents.json, pending.json and archive.json
db_dir = "{db_dir}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/spqf/spqf.log"
"#,
            db_dir = db_dir.display(),
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, db_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(db_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Default config file: `<config dir>/spqf/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spqf")
        .join("config.toml")
}

/// Default database directory: `<data dir>/spqf`
pub fn default_db_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spqf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SpqfConfig::new(PathBuf::from("/data/spqf"));

        assert_eq!(config.storage.db_dir, PathBuf::from("/data/spqf"));
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("spqf").join("config.toml");
        let db_dir = temp_dir.path().join("db");

        SpqfConfig::create_default(&config_path, &db_dir).unwrap();
        assert!(config_path.exists());

        let config = SpqfConfig::load(&config_path).unwrap();
        assert_eq!(config.storage.db_dir, db_dir);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generate_default_toml() {
        let toml = SpqfConfig::generate_default_toml(Path::new("/data/spqf"));

        assert!(toml.contains("db_dir = \"/data/spqf\""));
        assert!(toml.contains("level = \"info\""));
        // vote rules are per channel, not operator settings
        assert!(!toml.contains("plurality ="));
        assert!(!toml.contains("min_yes ="));
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = SpqfConfig::load(&config_path).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.db_dir, default_db_dir());
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[storage]\ndb_dir = 7\n").unwrap();

        assert!(SpqfConfig::load(&config_path).is_err());
    }

    #[test]
    fn test_load_or_default_with_missing_explicit_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(SpqfConfig::load_or_default(Some(&missing)).is_err());
    }
}
