use std::path::PathBuf;

use clap::Parser;
use lib_sync::configs::SyncConfig;
use serde::{Deserialize, Serialize};

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Keeps a sync session open and prints notifications as they are pushed", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long = "config", env = "SYNC_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SYNC_API_BASE_URL", help = "REST base URL of the backend.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "SYNC_PUSH_URL", help = "WebSocket URL of the notification stream.")]
    pub push_url: Option<String>,

    #[clap(long, env = "SYNC_AUTH_TOKEN", hide_env_values = true, help = "Bearer token for REST and push.")]
    pub auth_token: Option<String>,

    #[clap(long, env = "SYNC_DEBOUNCE_MS", help = "Autosave debounce in milliseconds.")]
    pub debounce_ms: Option<u64>,

    #[clap(long, env = "SYNC_TOAST_WINDOW_SECS", help = "Minimum seconds between autosave confirmations.")]
    pub toast_window_secs: Option<u64>,

    #[clap(long, env = "SYNC_CACHE_DIR", help = "Directory of the durable analysis cache.")]
    pub cache_dir: Option<PathBuf>,

    #[clap(long, env = "SYNC_CACHE_NAMESPACE", help = "Namespace (file stem) of the analysis cache.")]
    pub cache_namespace: Option<String>,

    #[clap(long, env = "SYNC_RECONNECT_DELAY_MS", help = "Delay in milliseconds before reconnecting the push stream.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "SYNC_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SYNC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "SYNC_CACHE_COLLECTION", help = "Link collection whose status changes invalidate cached analyses.")]
    pub collection: Option<String>,

    #[clap(long, help = "Only print events about this subject, e.g. programs/42.")]
    pub watch: Option<String>,
}

impl Config {
    /// The part of the command line that configures the session.
    pub fn to_layer(&self) -> SyncConfig {
        SyncConfig {
            api_base_url: self.api_base_url.clone(),
            push_url: self.push_url.clone(),
            auth_token: self.auth_token.clone(),
            debounce_ms: self.debounce_ms,
            toast_window_secs: self.toast_window_secs,
            cache_dir: self.cache_dir.clone(),
            cache_namespace: self.cache_namespace.clone(),
            reconnect_delay_ms: self.reconnect_delay_ms,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level.clone(),
        }
    }

    /// `collection/id` split from `--watch`.
    pub fn watch_subject(&self) -> Option<(String, String)> {
        let raw = self.watch.as_deref()?.trim_matches('/');
        let (collection, id) = raw.split_once('/')?;
        (!collection.is_empty() && !id.is_empty()).then(|| (collection.to_string(), id.to_string()))
    }
}

/// Resolves the session configuration from built-in defaults, the JSON file
/// (`sync_monitor.conf` unless `--config` says otherwise) and finally the
/// environment / command line.
pub fn resolve(cli: &Config) -> SyncConfig {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("sync_monitor.conf"));

    let mut current_config = SyncConfig::defaults();

    if config_file_path.exists() {
        match SyncConfig::from_json_file(&config_file_path) {
            Ok(file_config) => current_config = current_config.merge(file_config),
            Err(e) => log::warn!("{}. Falling back to other sources.", e),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli.to_layer())
}

pub fn load_config() -> (Config, SyncConfig) {
    let cli = Config::parse();
    let resolved = resolve(&cli);
    (cli, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiBaseUrl":"https://file/v1","debounceMs":900,"logLevel":"debug"}}"#).unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            debounce_ms: Some(400),
            ..Default::default()
        };
        let cfg = resolve(&cli);
        assert_eq!(cfg.api_base_url.as_deref(), Some("https://file/v1"));
        assert_eq!(cfg.debounce(), Duration::from_millis(400));
        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.toast_window(), Duration::from_secs(10));
    }

    #[test]
    fn config_file_flag_is_named_config() {
        let cli = Config::try_parse_from(["sync-monitor", "--config", "custom.conf", "--debounce-ms", "700"]).unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("custom.conf")));
        assert_eq!(cli.debounce_ms, Some(700));
        assert!(Config::try_parse_from(["sync-monitor", "--config-path", "custom.conf"]).is_err());
    }

    #[test]
    fn watch_subject_parsing() {
        let cli = Config {
            watch: Some("/programs/42".into()),
            ..Default::default()
        };
        assert_eq!(cli.watch_subject(), Some(("programs".into(), "42".into())));
        let cli = Config {
            watch: Some("programs".into()),
            ..Default::default()
        };
        assert_eq!(cli.watch_subject(), None);
    }
}
