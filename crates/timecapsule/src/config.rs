//! Configuration management for timecapsule.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "timecapsule";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "capsules.db";

/// Default directory for uploaded clips, under the data directory.
const OBJECTS_DIR_NAME: &str = "objects";

/// Base URL used for capsule invite links.
const DEFAULT_SHARE_BASE_URL: &str = "https://timecapsulecamera.app/join";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TIMECAPSULE_`, sections separated by `__`)
/// 2. TOML config file at `~/.config/timecapsule/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Unseal sweep configuration.
    pub unseal: UnsealConfig,
    /// Sharing configuration.
    pub sharing: SharingConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/timecapsule/capsules.db`
    pub database_path: Option<PathBuf>,
    /// Directory holding uploaded clips.
    /// Defaults to `~/.local/share/timecapsule/objects`
    pub objects_dir: Option<PathBuf>,
}

/// Unseal sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsealConfig {
    /// Seconds between sweeps for capsules past their unlock date.
    pub sweep_interval_secs: u64,
    /// Schedule a local notification when the sweep unseals a capsule.
    pub notify_on_unseal: bool,
    /// Reminder notifications, in days before the unlock date.
    pub reminder_days: Vec<u32>,
}

/// Sharing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Base URL for invite links; the capsule id and name are appended as query parameters.
    pub share_base_url: String,
}

impl Default for UnsealConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            notify_on_unseal: true,
            reminder_days: vec![7, 1],
        }
    }
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("TIMECAPSULE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.unseal.sweep_interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "sweep_interval_secs must be greater than 0".to_string(),
            });
        }

        if self.unseal.reminder_days.contains(&0) {
            return Err(Error::ConfigValidation {
                message: "reminder_days entries must be at least 1".to_string(),
            });
        }

        let base = &self.sharing.share_base_url;
        match url::Url::parse(base) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::ConfigValidation {
                    message: format!("share_base_url must be an http(s) URL: {base}"),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the clip storage directory, resolving defaults if not set.
    #[must_use]
    pub fn objects_dir(&self) -> PathBuf {
        self.storage
            .objects_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(OBJECTS_DIR_NAME))
    }

    /// Get the sweep interval as a Duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.unseal.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert!(config.storage.objects_dir.is_none());
        assert_eq!(config.unseal.sweep_interval_secs, 60);
        assert!(config.unseal.notify_on_unseal);
        assert_eq!(config.unseal.reminder_days, vec![7, 1]);
        assert_eq!(config.sharing.share_base_url, DEFAULT_SHARE_BASE_URL);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_sweep_interval() {
        let mut config = Config::default();
        config.unseal.sweep_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sweep_interval_secs"));
    }

    #[test]
    fn test_validate_zero_reminder_day() {
        let mut config = Config::default();
        config.unseal.reminder_days = vec![3, 0];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("reminder_days"));
    }

    #[test]
    fn test_validate_share_url_scheme() {
        let mut config = Config::default();
        config.sharing.share_base_url = "ftp://example.com/join".to_string();
        assert!(config.validate().is_err());

        config.sharing.share_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.sharing.share_base_url = "http://localhost:8080/join".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("capsules.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_objects_dir_default() {
        let path = Config::default().objects_dir();
        assert!(path.ends_with("timecapsule/objects"));
    }

    #[test]
    fn test_sweep_interval() {
        assert_eq!(Config::default().sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("timecapsule"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[unseal]\nsweep_interval_secs = 5\nreminder_days = [3]\n\n\
             [storage]\ndatabase_path = \"/tmp/x.db\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.unseal.sweep_interval_secs, 5);
        assert_eq!(config.unseal.reminder_days, vec![3]);
        assert!(config.unseal.notify_on_unseal);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[unseal]\nsweep_interval_secs = 0\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_unseal_config_deserialize_partial() {
        let json = r#"{"notify_on_unseal": false}"#;
        let unseal: UnsealConfig = serde_json::from_str(json).unwrap();
        assert!(!unseal.notify_on_unseal);
        assert_eq!(unseal.sweep_interval_secs, 60);
    }
}
