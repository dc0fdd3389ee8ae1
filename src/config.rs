//! Application configuration.
//!
//! The configuration is a JSON document stored in the platform config
//! directory (see `directories::ProjectDirs`). When the file does not exist
//! it is created with the defaults below, so a fresh device boots with a
//! usable setup.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILE_NAME: &str = "netsetup-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub paths: PathConfig,
    pub api: ApiConfig,
    pub probe: ProbeConfig,
    pub timings: TimingConfig,
    pub supplicant: SupplicantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub wifi_interface: String,
    pub eth_interface: String,
    /// Identity used towards the remote server, defaults to the ethernet MAC.
    pub device_id: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            wifi_interface: "wlan0".to_string(),
            eth_interface: "eth0".to_string(),
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub connections_file: PathBuf,
    pub connections_backup: PathBuf,
    pub supplicant_file: PathBuf,
    pub supplicant_backup: PathBuf,
    pub dhcpcd_file: PathBuf,
    pub dhcpcd_backup: PathBuf,
    pub wpa_ctrl_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            connections_file: "/var/lib/netsetup/connections.json".into(),
            connections_backup: "/var/lib/netsetup/connections.backup.json"
                .into(),
            supplicant_file: "/etc/wpa_supplicant/wpa_supplicant.conf".into(),
            supplicant_backup: "/etc/wpa_supplicant/wpa_supplicant.backup.conf"
                .into(),
            dhcpcd_file: "/etc/dhcpcd.conf".into(),
            dhcpcd_backup: "/etc/dhcpcd.backup.conf".into(),
            wpa_ctrl_dir: "/var/run/wpa_supplicant".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://multimedia.dbtouch.com/api/player".to_string(),
            poll_interval_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Public DNS resolver.
    pub primary_target: String,
    /// The product's own server.
    pub secondary_target: String,
    pub ping_count: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            primary_target: "8.8.8.8".to_string(),
            secondary_target: "screens.dbtouch.com".to_string(),
            ping_count: 6,
        }
    }
}

/// Settle delays, in seconds, used while the OS networking stack converges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_settle_secs: u64,
    pub eth_settle_secs: u64,
    pub store_settle_secs: u64,
    pub rollback_settle_secs: u64,
    pub delete_one_settle_secs: u64,
    pub delete_all_settle_secs: u64,
    pub switch_settle_secs: u64,
    /// Time the supplicant gets to collect scan results.
    pub scan_wait_secs: u64,
    pub scan_retry_secs: u64,
    /// Probe interval while waiting for convergence, 0 disables early exit.
    pub convergence_poll_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_settle_secs: 15,
            eth_settle_secs: 10,
            store_settle_secs: 10,
            rollback_settle_secs: 10,
            delete_one_settle_secs: 5,
            delete_all_settle_secs: 10,
            switch_settle_secs: 5,
            scan_wait_secs: 3,
            scan_retry_secs: 5,
            convergence_poll_secs: 0,
        }
    }
}

impl TimingConfig {
    /// All delays set to zero, used by tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            connect_settle_secs: 0,
            eth_settle_secs: 0,
            store_settle_secs: 0,
            rollback_settle_secs: 0,
            delete_one_settle_secs: 0,
            delete_all_settle_secs: 0,
            switch_settle_secs: 0,
            scan_wait_secs: 0,
            scan_retry_secs: 0,
            convergence_poll_secs: 0,
        }
    }

    pub fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplicantConfig {
    pub ctrl_interface: String,
    pub default_country: String,
}

impl Default for SupplicantConfig {
    fn default() -> Self {
        Self {
            ctrl_interface: "DIR=/var/run/wpa_supplicant GROUP=netdev"
                .to_string(),
            default_country: "HR".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration from `path`, or from the default location in
    /// the platform config directory when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        if !config_path.exists() {
            info!(
                "Config file {:?} not found, creating it with defaults",
                config_path
            );
            let config = AppConfig::default();
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(
                &config_path,
                serde_json::to_string_pretty(&config)?,
            )
            .with_context(|| format!("failed to write {:?}", config_path))?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {:?}", config_path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {:?}", config_path))?;
        info!("Config loaded from {:?}", config_path);
        Ok(config)
    }
}

fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "dbtouch", "netsetup")
        .ok_or_else(|| anyhow!("No home directory to place the config in"))?;
    Ok(proj_dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = AppConfig::load(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.timings.connect_settle_secs, 15);
        assert_eq!(config.supplicant.default_country, "HR");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"device": {"wifi_interface": "wlp58s0"}}"#)
            .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.device.wifi_interface, "wlp58s0");
        assert_eq!(config.device.eth_interface, "eth0");
        assert_eq!(config.probe.ping_count, 6);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();

        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
