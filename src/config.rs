//! Configuration handling for lynx-sync

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const LOCAL_CONFIG_FILE: &str = "lynx-sync.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WireGuard private key shared by every generated profile
    pub private_key: String,
    /// Country names as reported by the server directory
    pub countries: Vec<String>,
    /// Load percentage above which a bound server may be replaced
    pub max_load: f64,
    /// Number of recommendations to request per country
    pub limit: u32,
    /// Also maintain the "quick" profile bound to the best server overall
    pub recommended: bool,
    pub debug: bool,
    pub profile_dir: PathBuf,
    pub interface_prefix: String,
    pub api: ApiConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel: String,
    pub origin: String,
    /// Extra `redis-cli` options such as `-h` or `-p`
    pub client_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            countries: vec!["Switzerland".to_string()],
            max_load: 70.0,
            limit: 1,
            recommended: false,
            debug: false,
            profile_dir: PathBuf::from("/home/pi/.firewalla/run/wg_profile"),
            interface_prefix: "lynx".to_string(),
            api: ApiConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nordvpn.com".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel: "TO.FireMain".to_string(),
            origin: "VPNClient".to_string(),
            client_args: Vec::new(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load config from an explicit path, or from the default locations
    ///
    /// Without an explicit path, `./lynx-sync.toml` is tried first, then
    /// `~/.lynx-sync/config.toml`, then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load(&local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".lynx-sync").join("config.toml");
            if home_config.exists() {
                return Self::load(&home_config);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(LOCAL_CONFIG_FILE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.trim().is_empty() {
            return Err(ConfigError::Invalid("private_key is empty".to_string()));
        }
        if !(0.0..=100.0).contains(&self.max_load) {
            return Err(ConfigError::Invalid(format!(
                "max_load must be within 0-100, got {}",
                self.max_load
            )));
        }
        if self.limit == 0 {
            return Err(ConfigError::Invalid("limit must be at least 1".to_string()));
        }
        if self.interface_prefix.is_empty() {
            return Err(ConfigError::Invalid("interface_prefix is empty".to_string()));
        }
        Ok(())
    }
}
