//! # Session Configuration
//!
//! Layered configuration for a sync session. Every field is optional so that
//! sources can be stacked: built-in defaults, then a JSON file, then whatever
//! the host application collects from its environment or command line. Later
//! layers override earlier ones field by field through [`SyncConfig::merge`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SyncError};

/// Default autosave debounce.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1200;
/// Default window for automatic-save confirmations.
pub const DEFAULT_TOAST_WINDOW_SECS: u64 = 10;
/// Default durable cache namespace.
pub const DEFAULT_CACHE_NAMESPACE: &str = "accreditation.analysis-cache.v1";
/// Default push reconnect delay.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// One configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// REST base URL, e.g. `https://api.example.org/v1`. Required.
    pub api_base_url: Option<String>,
    /// Push stream endpoint. No push connection when unset.
    pub push_url: Option<String>,
    /// Bearer token for both REST and push.
    pub auth_token: Option<String>,
    /// Autosave debounce in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Automatic-save confirmation window in seconds.
    pub toast_window_secs: Option<u64>,
    /// Directory holding the durable cache file. In-memory cache when unset.
    pub cache_dir: Option<PathBuf>,
    /// Cache namespace (file stem).
    pub cache_namespace: Option<String>,
    /// Pause before reconnecting the push stream, in milliseconds.
    pub reconnect_delay_ms: Option<u64>,
    /// Log directory.
    pub log_dir: Option<PathBuf>,
    /// Log level name.
    pub log_level: Option<String>,
}

impl SyncConfig {
    /// The built-in defaults layer.
    pub fn defaults() -> Self {
        Self {
            debounce_ms: Some(DEFAULT_DEBOUNCE_MS),
            toast_window_secs: Some(DEFAULT_TOAST_WINDOW_SECS),
            cache_namespace: Some(DEFAULT_CACHE_NAMESPACE.to_string()),
            reconnect_delay_ms: Some(DEFAULT_RECONNECT_DELAY_MS),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    /// Reads one layer from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| SyncError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Returns `self` overridden by every value `other` sets.
    pub fn merge(self, other: SyncConfig) -> SyncConfig {
        SyncConfig {
            api_base_url: other.api_base_url.or(self.api_base_url),
            push_url: other.push_url.or(self.push_url),
            auth_token: other.auth_token.or(self.auth_token),
            debounce_ms: other.debounce_ms.or(self.debounce_ms),
            toast_window_secs: other.toast_window_secs.or(self.toast_window_secs),
            cache_dir: other.cache_dir.or(self.cache_dir),
            cache_namespace: other.cache_namespace.or(self.cache_namespace),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// The REST base URL, which has no default.
    pub fn require_api_base_url(&self) -> Result<&str> {
        self.api_base_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("apiBaseUrl is not set".to_string()))
    }

    /// Autosave debounce.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    /// Confirmation window for automatic saves.
    pub fn toast_window(&self) -> Duration {
        Duration::from_secs(self.toast_window_secs.unwrap_or(DEFAULT_TOAST_WINDOW_SECS))
    }

    /// Push reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS))
    }

    /// Cache namespace.
    pub fn cache_namespace(&self) -> &str {
        self.cache_namespace.as_deref().unwrap_or(DEFAULT_CACHE_NAMESPACE)
    }

    /// `cacheDir/<namespace>.json`, when a cache directory is configured.
    pub fn cache_file(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", self.cache_namespace())))
    }

    /// Log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    /// Log level name.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn later_layers_override_field_by_field() {
        let file = SyncConfig {
            api_base_url: Some("https://file.example/v1".into()),
            debounce_ms: Some(800),
            ..Default::default()
        };
        let cli = SyncConfig {
            debounce_ms: Some(300),
            ..Default::default()
        };
        let cfg = SyncConfig::defaults().merge(file).merge(cli);
        assert_eq!(cfg.require_api_base_url().unwrap(), "https://file.example/v1");
        assert_eq!(cfg.debounce(), Duration::from_millis(300));
        assert_eq!(cfg.toast_window(), Duration::from_secs(10));
        assert_eq!(cfg.cache_namespace(), DEFAULT_CACHE_NAMESPACE);
    }

    #[test]
    fn json_file_uses_camel_case_and_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiBaseUrl":"https://x/v1","cacheDir":"/tmp/c","reconnectDelayMs":250}}"#).unwrap();
        let cfg = SyncConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.api_base_url.as_deref(), Some("https://x/v1"));
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(
            cfg.cache_file().unwrap(),
            PathBuf::from("/tmp/c").join("accreditation.analysis-cache.v1.json")
        );
    }

    #[test]
    fn missing_base_url_and_bad_file_are_config_errors() {
        assert!(matches!(SyncConfig::defaults().require_api_base_url(), Err(SyncError::Config(_))));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(SyncConfig::from_json_file(file.path()), Err(SyncError::Config(_))));
    }
}
