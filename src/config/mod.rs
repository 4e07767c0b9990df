//! Permisync configuration file handling
//!
//! Loads and manages the ~/.config/permisync/config.yaml file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One remote partition endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the sheet API endpoint
    pub url: String,

    /// Spreadsheet identifier passed on every request
    pub sheet_id: String,
}

impl EndpointConfig {
    /// Create an endpoint config
    pub fn new(url: impl Into<String>, sheet_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sheet_id: sheet_id.into(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Administrative-permit ("PA") endpoint
    #[serde(default)]
    pub administrative: EndpointConfig,

    /// Legal-holiday ("FL") endpoint
    #[serde(default)]
    pub legal: EndpointConfig,

    /// Employee roster endpoint (queried with `type=employees`)
    #[serde(default)]
    pub employees: EndpointConfig,

    /// Fixed delay before a failed push is retried
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Window during which peer events collapse into one re-fetch
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    /// Path of the local backup database
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Identifier stamped on events this client publishes
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Ask the remote to validate record payloads on push
    #[serde(default)]
    pub validate_on_push: bool,
}

fn default_retry_delay_ms() -> u64 {
    30_000
}

fn default_debounce_window_ms() -> u64 {
    900
}

fn default_backup_path() -> PathBuf {
    crate::backup::BackupConfig::default().path
}

fn default_client_id() -> String {
    format!("permisync-{}", std::process::id())
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            administrative: EndpointConfig::default(),
            legal: EndpointConfig::default(),
            employees: EndpointConfig::default(),
            retry_delay_ms: default_retry_delay_ms(),
            debounce_window_ms: default_debounce_window_ms(),
            backup_path: default_backup_path(),
            client_id: default_client_id(),
            validate_on_push: false,
        }
    }
}

impl SyncConfig {
    /// Default config file location (~/.config/permisync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("permisync");
        path.push("config.yaml");
        path
    }

    /// Load config from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: SyncConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist yet
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Set the retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the debounce window
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window_ms = window.as_millis() as u64;
        self
    }

    /// Set the origin client id
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Debounce window as a Duration
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let yaml = r#"
administrative:
  url: "https://sheets.example/pa"
  sheet_id: "sheet-pa"
legal:
  url: "https://sheets.example/fl"
  sheet_id: "sheet-fl"
"#;
        let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.administrative.sheet_id, "sheet-pa");
        assert_eq!(config.retry_delay_ms, 30_000);
        assert_eq!(config.debounce_window_ms, 900);
        assert!(!config.validate_on_push);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = SyncConfig::default()
            .with_client_id("test-client")
            .with_retry_delay(Duration::from_secs(5));
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded.client_id, "test-client");
        assert_eq!(loaded.retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_setters() {
        let config = SyncConfig::default().with_debounce_window(Duration::from_millis(250));
        assert_eq!(config.debounce_window(), Duration::from_millis(250));
    }
}
