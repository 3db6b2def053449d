use serde::Deserialize;
use std::env;
use std::fs;

use crate::common::error::{MaVilleError, Result};

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which EntityStore adapter backs the services.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "json", "sqlite", or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Minutes without traffic before a live connection is torn down.
    #[serde(default = "default_idle_minutes")]
    pub idle_timeout_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the daily rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}
fn default_backend() -> String {
    "json".into()
}
fn default_data_dir() -> String {
    "data".into()
}
fn default_db_path() -> String {
    "data/maville.db".into()
}
fn default_idle_minutes() -> u64 {
    10
}
fn default_log_dir() -> String {
    "logs".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            db_path: default_db_path(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_minutes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads config.toml when present, then applies environment
    /// overrides. A missing file means pure defaults, not an error.
    pub fn load() -> Result<Self> {
        let mut config = match fs::read_to_string(CONFIG_PATH) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(MaVilleError::Config(format!(
                    "Failed to read config file '{CONFIG_PATH}': {e}"
                )))
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("MAVILLE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("MAVILLE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(backend) = env::var("MAVILLE_STORAGE") {
            self.storage.backend = backend;
        }
        if let Ok(dir) = env::var("MAVILLE_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Ok(dir) = env::var("MAVILLE_LOG_DIR") {
            self.logging.dir = dir;
        }
    }
}
