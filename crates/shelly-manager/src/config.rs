//! Configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use shelly_discovery::session::DEFAULT_CHANNEL_CAPACITY;
use shelly_discovery::{SessionConfig, SHELLY_SERVICE_TYPE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the device registry file
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("devices.yaml")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// mDNS service type to browse
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Timeout for each probe request in seconds (unset = wait indefinitely)
    #[serde(default)]
    pub probe_timeout_secs: Option<u64>,
    /// Number of announcements queued while a probe is in progress
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            probe_timeout_secs: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_service_type() -> String {
    SHELLY_SERVICE_TYPE.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Config {
    /// Convert to SessionConfig
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            registry_path: self.registry.path.clone(),
            service_type: self.discovery.service_type.clone(),
            probe_timeout: self.discovery.probe_timeout_secs.map(Duration::from_secs),
            channel_capacity: self.discovery.channel_capacity,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
