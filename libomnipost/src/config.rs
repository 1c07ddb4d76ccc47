//! Configuration management for Omnipost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/omnipost/posts.db".to_string(),
        }
    }
}

/// Dispatch loop tuning. The defaults match production behavior; tests
/// shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between dispatch ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Upper bound for a single publish attempt, timeout counts as failure.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    /// How long a `posting` claim is honored before the post is handed
    /// back to the queue.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
    /// Publish attempts per target per tick (transient errors only).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Most due posts processed in one tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_publish_timeout_secs() -> u64 {
    30
}

fn default_claim_lease_secs() -> u64 {
    600
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_batch_size() -> u32 {
    50
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
            claim_lease_secs: default_claim_lease_secs(),
            retry_attempts: default_retry_attempts(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub twitter: PlatformConfig,
    #[serde(default)]
    pub facebook: PlatformConfig,
    #[serde(default)]
    pub instagram: PlatformConfig,
    #[serde(default)]
    pub linkedin: PlatformConfig,
    #[serde(default)]
    pub tiktok: PlatformConfig,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Twitter => &self.twitter,
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
            Platform::Linkedin => &self.linkedin,
            Platform::Tiktok => &self.tiktok,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Override the platform's API origin, mainly for tests and proxies.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to the
    /// defaults when no config file exists yet.
    ///
    /// A file named explicitly through `OMNIPOST_CONFIG` must exist;
    /// only the default location is allowed to be absent.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            if std::env::var("OMNIPOST_CONFIG").is_ok() {
                return Err(ConfigError::ReadError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} (from OMNIPOST_CONFIG)", config_path.display()),
                ))
                .into());
            }
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig::default(),
            daemon: DaemonConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.daemon.tick_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "daemon.tick_secs must be at least 1".to_string(),
            ));
        }
        if self.daemon.publish_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "daemon.publish_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.daemon.claim_lease_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "daemon.claim_lease_secs must be at least 1".to_string(),
            ));
        }
        if self.daemon.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "daemon.retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OMNIPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("omnipost").join("config.toml"))
}
