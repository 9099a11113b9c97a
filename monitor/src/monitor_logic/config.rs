use clap::Parser;
use lib_checkin::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "checkin_monitor.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Watches real-time check-in status changes for a user", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "CHECKIN_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CHECKIN_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CHECKIN_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CHECKIN_BASE_URL", help = "HTTP(S) base URL of the API server.")]
    pub base_url: Option<String>,

    #[clap(long, env = "CHECKIN_AUTH_TOKEN", help = "Bearer token sent during the handshake.")]
    pub auth_token: Option<String>,

    #[clap(long, env = "CHECKIN_USER_ID", help = "User whose status queue is watched.")]
    pub user_id: Option<String>,

    #[clap(long = "child", env = "CHECKIN_CHILDREN", value_delimiter = ',', help = "Child ids to watch (repeatable or comma separated).")]
    #[serde(default)]
    pub children: Vec<String>,

    #[clap(long = "service", env = "CHECKIN_SERVICES", value_delimiter = ',', help = "Service ids to watch (repeatable or comma separated).")]
    #[serde(default)]
    pub services: Vec<String>,

    #[clap(long, env = "CHECKIN_MAX_RECONNECT_ATTEMPTS", help = "Consecutive failed attempts before giving up.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "CHECKIN_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "CHECKIN_HEARTBEAT_TIMEOUT_MS", help = "Inbound silence in milliseconds before reconnecting (0 disables).")]
    pub heartbeat_timeout_ms: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            base_url: other.base_url.or(self.base_url),
            auth_token: other.auth_token.or(self.auth_token),
            user_id: other.user_id.or(self.user_id),
            children: if other.children.is_empty() { self.children } else { other.children },
            services: if other.services.is_empty() { self.services } else { other.services },
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            heartbeat_timeout_ms: other.heartbeat_timeout_ms.or(self.heartbeat_timeout_ms),
        }
    }

    /// Library configuration; unset fields keep the library defaults.
    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            auth_token: self.auth_token.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts.unwrap_or(defaults.max_reconnect_attempts),
            reconnect_base_delay_ms: self.reconnect_base_delay_ms.unwrap_or(defaults.reconnect_base_delay_ms),
            heartbeat_timeout_ms: self.heartbeat_timeout_ms.unwrap_or(defaults.heartbeat_timeout_ms),
            ..defaults
        }
    }
}

fn defaults() -> Config {
    Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        base_url: Some("http://localhost:8080".to_string()),
        ..Default::default()
    }
}

/// Outcome of reading the JSON config file, logged once the logger is up.
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Loaded(PathBuf),
    Missing(PathBuf),
    Unreadable(PathBuf, String),
    Invalid(PathBuf, String),
}

impl FileStatus {
    pub fn log(&self) {
        match self {
            FileStatus::Loaded(path) => log::info!("Loaded config file {}.", path.display()),
            FileStatus::Missing(path) => log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display()),
            FileStatus::Unreadable(path, e) => log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e),
            FileStatus::Invalid(path, e) => log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e),
        }
    }
}

fn read_config_file(path: &Path) -> (Option<Config>, FileStatus) {
    if !path.exists() {
        return (None, FileStatus::Missing(path.to_path_buf()));
    }
    let config_str = match fs::read_to_string(path) {
        Ok(config_str) => config_str,
        Err(e) => return (None, FileStatus::Unreadable(path.to_path_buf(), e.to_string())),
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => (Some(file_config), FileStatus::Loaded(path.to_path_buf())),
        Err(e) => (None, FileStatus::Invalid(path.to_path_buf(), e.to_string())),
    }
}

/// Layers defaults, the JSON file and `cli` (CLI args plus env vars), later
/// layers winning field by field.
pub fn resolve_config(cli: Config) -> (Config, FileStatus) {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = defaults();
    let (file_config, status) = read_config_file(&config_file_path);
    if let Some(file_config) = file_config {
        current_config = current_config.merge(file_config);
    }
    (current_config.merge(cli), status)
}

pub fn load_config() -> (Config, FileStatus) {
    resolve_config(Config::parse())
}
