//! Snapshot of the live network state of the device.

use log::{error, warn};
use serde::Serialize;

use crate::{
    config::DeviceConfig,
    error::Result,
    net_ctl::NetIfCtl,
    net_data::{ConnectionStore, ConnectionStoreOps},
};

/// The live state a workflow decides on, captured once per workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetContext {
    pub eth_mac: Option<String>,
    pub wifi_mac: Option<String>,
    pub current_ssid: Option<String>,
    pub eth_ip: Option<String>,
    pub wifi_ip: Option<String>,
    pub store: ConnectionStore,
}

impl NetContext {
    /// Reads the interfaces and the connection store.
    ///
    /// Interface reads that fail are logged and left empty, only a failing
    /// store read is an error.
    pub async fn capture<I, S>(
        net_if: &I, store: &S, device: &DeviceConfig,
    ) -> Result<Self>
    where
        I: NetIfCtl + ?Sized,
        S: ConnectionStoreOps + ?Sized,
    {
        let store = store.load()?;

        let eth_mac = net_if
            .mac_address(&device.eth_interface)
            .await
            .map_err(|e| error!("Failed to read ethernet MAC, error: {}", e))
            .ok();
        let wifi_mac = net_if
            .mac_address(&device.wifi_interface)
            .await
            .map_err(|e| error!("Failed to read wifi MAC, error: {}", e))
            .ok();
        let current_ssid = net_if
            .current_ssid()
            .await
            .map_err(|e| warn!("Failed to read current SSID, error: {}", e))
            .ok()
            .flatten();
        let eth_ip = net_if
            .ip_address(&device.eth_interface)
            .await
            .map_err(|e| warn!("Failed to read ethernet IP, error: {}", e))
            .ok()
            .flatten();
        let wifi_ip = net_if
            .ip_address(&device.wifi_interface)
            .await
            .map_err(|e| warn!("Failed to read wifi IP, error: {}", e))
            .ok()
            .flatten();

        Ok(Self { eth_mac, wifi_mac, current_ssid, eth_ip, wifi_ip, store })
    }
}
