//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Optional TOML configuration file contents
///
/// All fields are optional; anything missing falls back to the compiled
/// defaults in [`ServerConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub data_dir: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub mail: MailSettings,
}

/// Outbound mail settings (HTTP mail API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Base URL used to build invitation acceptance links in emails
    pub public_base_url: String,
    pub mail: MailSettings,
    /// Two-factor code lifetime in minutes
    pub code_ttl_minutes: i64,
    /// Invitation lifetime in days
    pub invitation_ttl_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host: "127.0.0.1".to_string(),
            port: 5740,
            public_base_url: "http://127.0.0.1:5740".to_string(),
            mail: MailSettings::default(),
            code_ttl_minutes: 10,
            invitation_ttl_days: 7,
        }
    }
}

impl ServerConfig {
    /// Resolve the service configuration with the priority order:
    /// 1. Command-line arguments (highest)
    /// 2. Environment variables (`MOSIFRA_DATA_DIR`, `MOSIFRA_PORT`)
    /// 3. TOML config file
    /// 4. Compiled defaults (fallback)
    pub fn resolve(cli_data_dir: Option<&str>, cli_port: Option<u16>) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = find_config_file() {
            let toml_config = load_toml_config(&path)?;
            info!("Loaded config file: {}", path.display());
            if let Some(dir) = toml_config.data_dir {
                config.data_dir = PathBuf::from(dir);
            }
            if let Some(host) = toml_config.host {
                config.host = host;
            }
            if let Some(port) = toml_config.port {
                config.port = port;
            }
            if let Some(url) = toml_config.public_base_url {
                config.public_base_url = url;
            }
            config.mail = toml_config.mail;
        }

        if let Ok(dir) = std::env::var("MOSIFRA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("MOSIFRA_PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid MOSIFRA_PORT value: {}", port)))?;
        }
        if let Ok(key) = std::env::var("MOSIFRA_MAIL_API_KEY") {
            config.mail.api_key = Some(key);
        }

        if let Some(dir) = cli_data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = cli_port {
            config.port = port;
        }

        Ok(config)
    }

    /// Path of the SQLite database inside the data folder
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("mosifra.db")
    }
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse config failed: {}", e)))
}

/// Locate the configuration file for the platform
///
/// Checks `~/.config/mosifra/config.toml` first, then
/// `/etc/mosifra/config.toml` on Linux.
fn find_config_file() -> Result<PathBuf> {
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("mosifra").join("config.toml")) {
        if user_config.exists() {
            return Ok(user_config);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mosifra/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }
    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mosifra"))
        .unwrap_or_else(|| PathBuf::from("./mosifra_data"))
}
