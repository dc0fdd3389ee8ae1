//! This module controls the network interfaces of the device.
//!
//! It provides the `NetIfCtl` trait and the `NetIfController` struct, which
//! wraps the external commands and the supplicant control socket used to
//! bring interfaces up and down, restart dhcpcd, reload the supplicant and
//! read the live network state.

mod cmd_runner;
mod scan;
mod wpa_ctl;

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use log::{error, info, warn};

pub use cmd_runner::{run_checked, CmdRunner, CmdRunnerOps};
pub use scan::{parse_scan_results, ScannedNetwork};
pub use wpa_ctl::{WpaCtl, WpaCtlClientOps};

#[cfg(test)]
pub use cmd_runner::{CmdOutput, MockCmdRunnerOps};

use crate::error::{NetError, Result};

#[cfg(test)]
use mockall::automock;

pub const NETWORK_SERVICE: &str = "dhcpcd.service";
pub const SYS_NET_DIR: &str = "/sys/class/net";

/// Trait for network interface control.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetIfCtl: Send + Sync + 'static {
    async fn interface_up(&self, iface: &str) -> Result<()>;

    async fn interface_down(&self, iface: &str) -> Result<()>;

    /// Restarts the DHCP client daemon.
    async fn restart_network_service(&self) -> Result<()>;

    /// Makes the supplicant reload its configuration file.
    async fn reconfigure_wifi(&self) -> Result<()>;

    /// The SSID the Wi-Fi interface is associated with.
    async fn current_ssid(&self) -> Result<Option<String>>;

    /// The IPv4 address of an interface, `None` when it has none.
    async fn ip_address(&self, iface: &str) -> Result<Option<String>>;

    async fn mac_address(&self, iface: &str) -> Result<String>;

    /// Lists the Wi-Fi networks in range.
    ///
    /// A failed scan is retried once after the Wi-Fi interface was cycled
    /// and the networking restarted.
    async fn scan_wifi(&self) -> Result<Vec<ScannedNetwork>>;
}

/// Interface controller backed by the system commands.
pub struct NetIfController<R, W> {
    runner: R,
    wpa_ctl: W,
    wifi_interface: String,
    sys_net_dir: PathBuf,
    scan_wait: Duration,
    scan_retry: Duration,
}

impl<R: CmdRunnerOps, W: WpaCtlClientOps> NetIfController<R, W> {
    pub fn new(runner: R, wpa_ctl: W, wifi_interface: &str) -> Self {
        Self {
            runner,
            wpa_ctl,
            wifi_interface: wifi_interface.to_string(),
            sys_net_dir: PathBuf::from(SYS_NET_DIR),
            scan_wait: Duration::from_secs(3),
            scan_retry: Duration::from_secs(5),
        }
    }

    pub fn with_scan_timings(mut self, wait: Duration, retry: Duration) -> Self {
        self.scan_wait = wait;
        self.scan_retry = retry;
        self
    }

    #[cfg(test)]
    pub fn with_sys_net_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sys_net_dir = dir.into();
        self
    }

    async fn try_scan(&self) -> Result<Vec<ScannedNetwork>> {
        self.wpa_ctl.scan()?;
        tokio::time::sleep(self.scan_wait).await;
        let raw = self.wpa_ctl.scan_results()?;
        Ok(parse_scan_results(&raw))
    }
}

/// Extracts the IPv4 address from `ifconfig` output.
pub fn ipv4_from_ifconfig(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("inet") => tokens
                .next()
                .map(|addr| addr.trim_start_matches("addr:").to_string()),
            _ => None,
        }
    })
}

#[async_trait]
impl<R: CmdRunnerOps, W: WpaCtlClientOps> NetIfCtl for NetIfController<R, W> {
    async fn interface_up(&self, iface: &str) -> Result<()> {
        info!("Turning on interface {}", iface);
        run_checked(&self.runner, "ifconfig", &[iface, "up"]).await?;
        Ok(())
    }

    async fn interface_down(&self, iface: &str) -> Result<()> {
        info!("Turning off interface {}", iface);
        run_checked(&self.runner, "ifconfig", &[iface, "down"]).await?;
        Ok(())
    }

    async fn restart_network_service(&self) -> Result<()> {
        info!("Restarting {}", NETWORK_SERVICE);
        run_checked(&self.runner, "systemctl", &["restart", NETWORK_SERVICE])
            .await?;
        Ok(())
    }

    async fn reconfigure_wifi(&self) -> Result<()> {
        self.wpa_ctl.reconfigure()
    }

    async fn current_ssid(&self) -> Result<Option<String>> {
        self.wpa_ctl.current_ssid()
    }

    async fn ip_address(&self, iface: &str) -> Result<Option<String>> {
        let output = self.runner.run("ifconfig", vec![iface.to_string()]).await?;
        if !output.success {
            warn!("No address information for {}", iface);
            return Ok(None);
        }
        Ok(ipv4_from_ifconfig(&output.stdout))
    }

    async fn mac_address(&self, iface: &str) -> Result<String> {
        let path = self.sys_net_dir.join(iface).join("address");
        let mac = tokio::fs::read_to_string(&path).await.map_err(|e| {
            error!("Failed to read MAC address from {:?}, error: {}", path, e);
            NetError::command(format!("read {:?}", path), e)
        })?;
        Ok(mac.trim().to_string())
    }

    async fn scan_wifi(&self) -> Result<Vec<ScannedNetwork>> {
        match self.try_scan().await {
            Ok(networks) => return Ok(networks),
            Err(e) => error!("Wi-Fi scan failed, retrying, error: {}", e),
        }

        let iface = self.wifi_interface.clone();
        if let Err(e) = self.interface_down(&iface).await {
            error!("Failed to turn off {}, error: {}", iface, e);
        }
        if let Err(e) = self.interface_up(&iface).await {
            error!("Failed to turn on {}, error: {}", iface, e);
        }
        if let Err(e) = self.reconfigure_wifi().await {
            error!("Failed to reconfigure supplicant, error: {}", e);
        }
        if let Err(e) = self.restart_network_service().await {
            error!("Failed to restart networking, error: {}", e);
        }
        tokio::time::sleep(self.scan_retry).await;

        self.try_scan().await
    }
}
