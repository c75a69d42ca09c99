//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{RelayError, RelayResult};

pub const CALSTORE_DIR: &str = "calstore";
pub const NOTIFYSTORE_DIR: &str = "notifystore";
pub const OUTBOX_DIR: &str = "outbox";

fn default_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fetch_timeout() -> String {
    "30s".to_string()
}

fn default_cleanup_interval() -> String {
    "1h".to_string()
}

fn default_sender() -> String {
    "ical-relay@localhost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Public base URL, used in links handed out to clients.
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_log_level", alias = "log_level")]
    pub log_level: String,

    #[serde(default, alias = "storage_path")]
    pub storage_path: Option<String>,

    #[serde(default, alias = "data_file")]
    pub data_file: Option<String>,

    #[serde(default = "default_fetch_timeout", alias = "fetch_timeout")]
    pub fetch_timeout: String,

    #[serde(default, alias = "super_tokens")]
    pub super_tokens: Vec<String>,

    #[serde(default = "default_cleanup_interval", alias = "cleanup_interval")]
    pub cleanup_interval: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: default_addr(),
            url: default_url(),
            log_level: default_log_level(),
            storage_path: None,
            data_file: None,
            fetch_timeout: default_fetch_timeout(),
            super_tokens: Vec::new(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_sender")]
    pub sender: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            sender: default_sender(),
        }
    }
}

/// Configuration from `config.toml`, overridable by `ICAL_RELAY_*` variables
/// (`ICAL_RELAY_SERVER__ADDR=0.0.0.0:80`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub mail: MailConfig,

    /// Directory of the config file; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl RelayConfig {
    /// ~/.config/ical-relay/config.toml
    pub fn default_path() -> RelayResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RelayError::Config("Could not determine config directory".into()))?
            .join("ical-relay");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from the default location if none is given.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> RelayResult<Self> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };

        let mut config: RelayConfig = Config::builder()
            .add_source(File::from(config_path.clone()).required(required))
            .add_source(
                Environment::with_prefix("ICAL_RELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.super_tokens"),
            )
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RelayError::Config(e.to_string()))?;

        config.base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(path).into_owned());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    /// Root of all state: history files, snapshots, outgoing mail.
    pub fn storage_path(&self) -> PathBuf {
        match &self.server.storage_path {
            Some(path) => self.resolve(path),
            None => self.base_dir.clone(),
        }
    }

    pub fn data_file(&self) -> PathBuf {
        match &self.server.data_file {
            Some(path) => self.resolve(path),
            None => self.storage_path().join("data.toml"),
        }
    }

    pub fn fetch_timeout(&self) -> RelayResult<Duration> {
        parse_std_duration("fetch-timeout", &self.server.fetch_timeout)
    }

    pub fn cleanup_interval(&self) -> RelayResult<Duration> {
        parse_std_duration("cleanup-interval", &self.server.cleanup_interval)
    }

    /// Create the storage subdirectories.
    pub fn prepare_storage(&self) -> RelayResult<()> {
        let storage = self.storage_path();
        for dir in [CALSTORE_DIR, NOTIFYSTORE_DIR, OUTBOX_DIR] {
            std::fs::create_dir_all(storage.join(dir))?;
        }
        Ok(())
    }
}

fn parse_std_duration(name: &str, value: &str) -> RelayResult<Duration> {
    parse_duration(value)
        .and_then(|d| d.to_std().map_err(|e| e.to_string()))
        .map_err(|e| RelayError::Config(format!("invalid {name} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nurl = \"https://cal.example.com\"\n").unwrap();

        let config = RelayConfig::load(Some(&path)).expect("Should load");

        assert_eq!(config.server.addr, "127.0.0.1:8080");
        assert_eq!(config.server.url, "https://cal.example.com");
        assert_eq!(config.storage_path(), dir.path());
        assert_eq!(config.data_file(), dir.path().join("data.toml"));
        assert_eq!(config.fetch_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(config.cleanup_interval().unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nstorage-path = \"state\"\nsuper-tokens = [\"root\"]\nfetch-timeout = \"5s\"\n\n[mail]\nsender = \"relay@example.com\"\n",
        )
        .unwrap();

        let config = RelayConfig::load(Some(&path)).unwrap();
        config.prepare_storage().unwrap();

        let storage = dir.path().join("state");
        assert_eq!(config.storage_path(), storage);
        assert!(storage.join(CALSTORE_DIR).is_dir());
        assert!(storage.join(OUTBOX_DIR).is_dir());
        assert_eq!(config.server.super_tokens, vec!["root"]);
        assert_eq!(config.mail.sender, "relay@example.com");
        assert_eq!(config.fetch_timeout().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(RelayConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
