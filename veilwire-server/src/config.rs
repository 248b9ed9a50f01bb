//! TOML configuration.
//!
//! A missing config file is written out with defaults on first start, so
//! a bare `veilwire-server` always comes up listening.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Encode(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Encode(e) => write!(f, "config encode error: {e}"),
        }
    }
}
impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}
impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Encode(e)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub plugins_dir: PathBuf,
    pub storage_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Listen backlog for the accept queue.
    pub max_available_connections: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A `tracing` filter string: `debug`, `info`, `warn,veilwire_server=debug`, …
    pub level: String,
}

/// Connection settings for the SQL-backed storage variant. Recognized and
/// validated here; the file-backed storage ignores it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbConfig {
    pub role: String,
    pub role_passwd: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub client_tcp_endpoint: EndpointConfig,
    pub logging: LoggingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<DbConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                logs_dir: "data/logs".into(),
                plugins_dir: "data/plugins".into(),
                storage_dir: "data/storage".into(),
            },
            client_tcp_endpoint: EndpointConfig {
                host: "0.0.0.0".to_owned(),
                port: 5477,
                max_available_connections: 950,
            },
            logging: LoggingConfig { level: "debug".to_owned() },
            db: None,
        }
    }
}

impl Config {
    /// Read the file, or write defaults there and return them when it
    /// does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.write(path)?;
            return Ok(config);
        }
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Write this config as TOML, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Create every configured directory that does not exist yet.
    pub fn make_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.paths.logs_dir)?;
        fs::create_dir_all(&self.paths.plugins_dir)?;
        fs::create_dir_all(&self.paths.storage_dir)?;
        Ok(())
    }
}
