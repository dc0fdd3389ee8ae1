//! This module defines the schemas of the stored connection profiles.
//! They are serialized as the `{ wifi: [...], eth: [...] }` JSON document that
//! is the single source of truth for what gets programmed into the OS.

use std::net::Ipv4Addr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Locally generated, stable identifier of a stored profile.
pub type ConnectionId = String;

/// Server-assigned identifier of the remote registration record.
pub type NetworkSetupId = u64;

/// Priority given to a newly added or explicitly selected Wi-Fi profile.
pub const PREFERRED_PRIORITY: u32 = 2;

/// Priority of every other Wi-Fi profile.
pub const DEFAULT_PRIORITY: u32 = 1;

/// The category of a stored connection.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Wifi,
    Eth,
}

/// Wi-Fi encryption, serialized with the labels the server and UI use.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encryption {
    #[default]
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "WPA / WPA2")]
    WpaWpa2,
}

/// Authentication, key management and protocol parameters of a Wi-Fi
/// network block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionOptions {
    #[serde(rename = "type")]
    pub kind: Encryption,
    pub auth_alg: String,
    pub key_mgmt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
}

impl EncryptionOptions {
    /// Default options for an encryption type.
    pub fn defaults_for(kind: Encryption) -> Self {
        match kind {
            Encryption::Open => Self {
                kind,
                auth_alg: "OPEN".to_string(),
                key_mgmt: "NONE".to_string(),
                pairwise: None,
                proto: None,
            },
            Encryption::Wep => Self {
                kind,
                auth_alg: "OPEN SHARED".to_string(),
                key_mgmt: "NONE".to_string(),
                pairwise: None,
                proto: None,
            },
            Encryption::WpaWpa2 => Self {
                kind,
                auth_alg: "OPEN SHARED".to_string(),
                key_mgmt: "WPA-PSK".to_string(),
                pairwise: Some("TKIP CCMP".to_string()),
                proto: Some("WPA RSN".to_string()),
            },
        }
    }
}

/// Static IPv4 settings of a profile.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticIp {
    pub ip_address: String,
    pub subnet_mask: String,
    pub default_gateway: String,
    #[serde(default)]
    pub preferred_dns: String,
    #[serde(default)]
    pub alternative_dns: String,
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid {} {:?}", field, value))
}

impl StaticIp {
    /// Checks that every field can be written to a dhcpcd stanza: IPv4
    /// addresses, a contiguous subnet mask and optional DNS servers.
    pub fn validate(&self) -> Result<()> {
        parse_ipv4("ip address", &self.ip_address)?;
        parse_ipv4("default gateway", &self.default_gateway)?;

        let mask = u32::from(parse_ipv4("subnet mask", &self.subnet_mask)?);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(anyhow!("invalid subnet mask {:?}", self.subnet_mask));
        }

        for dns in [&self.preferred_dns, &self.alternative_dns] {
            if !dns.trim().is_empty() {
                parse_ipv4("dns server", dns)?;
            }
        }
        Ok(())
    }
}

/// A stored Wi-Fi profile.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WifiProfile {
    pub id: ConnectionId,
    #[serde(default)]
    pub network_setup_id: Option<NetworkSetupId>,
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub encryption: Encryption,
    #[serde(default)]
    pub encryption_options: Option<EncryptionOptions>,
    pub priority: u32,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIp>,
}

impl WifiProfile {
    /// The stored encryption options, or the defaults of the encryption type.
    pub fn effective_options(&self) -> EncryptionOptions {
        self.encryption_options
            .clone()
            .unwrap_or_else(|| EncryptionOptions::defaults_for(self.encryption))
    }
}

/// A stored Ethernet profile, always static-IP.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EthProfile {
    pub id: ConnectionId,
    #[serde(default)]
    pub network_setup_id: Option<NetworkSetupId>,
    #[serde(default)]
    pub is_used: bool,
    #[serde(rename = "static")]
    pub static_ip: StaticIp,
}

/// Either kind of stored profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Wifi(WifiProfile),
    Eth(EthProfile),
}

impl Profile {
    pub fn id(&self) -> &str {
        match self {
            Profile::Wifi(wifi) => &wifi.id,
            Profile::Eth(eth) => &eth.id,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            Profile::Wifi(_) => ConnectionKind::Wifi,
            Profile::Eth(_) => ConnectionKind::Eth,
        }
    }

    pub fn network_setup_id(&self) -> Option<NetworkSetupId> {
        match self {
            Profile::Wifi(wifi) => wifi.network_setup_id,
            Profile::Eth(eth) => eth.network_setup_id,
        }
    }
}

/// The persisted document with every known profile.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStore {
    #[serde(default)]
    pub wifi: Vec<WifiProfile>,
    #[serde(default)]
    pub eth: Vec<EthProfile>,
}

impl ConnectionStore {
    pub fn len_of(&self, kind: ConnectionKind) -> usize {
        match kind {
            ConnectionKind::Wifi => self.wifi.len(),
            ConnectionKind::Eth => self.eth.len(),
        }
    }

    pub fn find_by_id(&self, kind: ConnectionKind, id: &str) -> Option<Profile> {
        match kind {
            ConnectionKind::Wifi => self
                .wifi
                .iter()
                .find(|conn| conn.id == id)
                .cloned()
                .map(Profile::Wifi),
            ConnectionKind::Eth => self
                .eth
                .iter()
                .find(|conn| conn.id == id)
                .cloned()
                .map(Profile::Eth),
        }
    }

    pub fn find_by_setup_id(
        &self, kind: ConnectionKind, setup_id: NetworkSetupId,
    ) -> Option<Profile> {
        match kind {
            ConnectionKind::Wifi => self
                .wifi
                .iter()
                .find(|conn| conn.network_setup_id == Some(setup_id))
                .cloned()
                .map(Profile::Wifi),
            ConnectionKind::Eth => self
                .eth
                .iter()
                .find(|conn| conn.network_setup_id == Some(setup_id))
                .cloned()
                .map(Profile::Eth),
        }
    }

    /// Removes a profile, returning it if it was stored.
    pub fn remove(&mut self, kind: ConnectionKind, id: &str) -> Option<Profile> {
        match kind {
            ConnectionKind::Wifi => {
                let idx = self.wifi.iter().position(|conn| conn.id == id)?;
                Some(Profile::Wifi(self.wifi.remove(idx)))
            }
            ConnectionKind::Eth => {
                let idx = self.eth.iter().position(|conn| conn.id == id)?;
                Some(Profile::Eth(self.eth.remove(idx)))
            }
        }
    }

    pub fn set_priority(&mut self, id: &str, priority: u32) -> bool {
        match self.wifi.iter_mut().find(|conn| conn.id == id) {
            Some(conn) => {
                conn.priority = priority;
                true
            }
            None => false,
        }
    }

    pub fn reset_all_priorities(&mut self) {
        self.wifi.iter_mut().for_each(|conn| conn.priority = DEFAULT_PRIORITY);
    }

    /// Marks an ethernet profile as used. Marking one as used clears the flag
    /// on every other profile, since only one ethernet interface exists.
    pub fn set_used(&mut self, id: &str, is_used: bool) -> bool {
        if !self.eth.iter().any(|conn| conn.id == id) {
            return false;
        }

        for conn in self.eth.iter_mut() {
            if conn.id == id {
                conn.is_used = is_used;
            } else if is_used {
                conn.is_used = false;
            }
        }
        true
    }

    pub fn reset_all_used(&mut self) {
        self.eth.iter_mut().for_each(|conn| conn.is_used = false);
    }

    pub fn used_eth(&self) -> Option<&EthProfile> {
        self.eth.iter().find(|conn| conn.is_used)
    }

    pub fn set_network_setup_id(
        &mut self, kind: ConnectionKind, id: &str,
        setup_id: Option<NetworkSetupId>,
    ) -> bool {
        match kind {
            ConnectionKind::Wifi => self
                .wifi
                .iter_mut()
                .find(|conn| conn.id == id)
                .map(|conn| conn.network_setup_id = setup_id)
                .is_some(),
            ConnectionKind::Eth => self
                .eth
                .iter_mut()
                .find(|conn| conn.id == id)
                .map(|conn| conn.network_setup_id = setup_id)
                .is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_ip(mask: &str) -> StaticIp {
        StaticIp {
            ip_address: "192.168.1.50".to_string(),
            subnet_mask: mask.to_string(),
            default_gateway: "192.168.1.1".to_string(),
            preferred_dns: "8.8.8.8".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_static_ip_validation() {
        assert!(static_ip("255.255.255.0").validate().is_ok());
        assert!(static_ip("255.255.0.0").validate().is_ok());
        assert!(static_ip("255.255.255").validate().is_err());
        assert!(static_ip("255.0.255.0").validate().is_err());

        let mut bad_ip = static_ip("255.255.255.0");
        bad_ip.ip_address = "192.168.1".to_string();
        assert!(bad_ip.validate().is_err());

        let mut bad_dns = static_ip("255.255.255.0");
        bad_dns.alternative_dns = "dns.example".to_string();
        assert!(bad_dns.validate().is_err());
    }

    fn eth(id: &str, is_used: bool) -> EthProfile {
        EthProfile {
            id: id.to_string(),
            network_setup_id: None,
            is_used,
            static_ip: StaticIp::default(),
        }
    }

    #[test]
    fn test_encryption_labels() {
        assert_eq!(
            serde_json::to_string(&Encryption::WpaWpa2).unwrap(),
            "\"WPA / WPA2\""
        );
        let enc: Encryption = serde_json::from_str("\"WEP\"").unwrap();
        assert_eq!(enc, Encryption::Wep);
    }

    #[test]
    fn test_wifi_profile_json_layout() {
        let json = r#"{
            "id": "1700000000000",
            "networkSetupId": null,
            "priority": 2,
            "ssid": "Home",
            "password": "secret123",
            "encryption": "WPA / WPA2",
            "encryptionOptions": {
                "type": "WPA / WPA2",
                "authAlg": "OPEN SHARED",
                "keyMgmt": "WPA-PSK",
                "pairwise": "TKIP CCMP",
                "proto": "WPA RSN"
            },
            "static": {
                "ipAddress": "192.168.1.50",
                "subnetMask": "255.255.255.0",
                "defaultGateway": "192.168.1.1",
                "preferredDns": "8.8.8.8",
                "alternativeDns": ""
            }
        }"#;

        let profile: WifiProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.ssid, "Home");
        assert_eq!(profile.encryption, Encryption::WpaWpa2);
        assert_eq!(
            profile.effective_options(),
            EncryptionOptions::defaults_for(Encryption::WpaWpa2)
        );
        assert_eq!(profile.static_ip.unwrap().ip_address, "192.168.1.50");
    }

    #[test]
    fn test_missing_options_fall_back_to_defaults() {
        let json = r#"{"id": "1", "ssid": "Cafe", "encryption": "OPEN", "priority": 1}"#;
        let profile: WifiProfile = serde_json::from_str(json).unwrap();
        let options = profile.effective_options();
        assert_eq!(options.auth_alg, "OPEN");
        assert_eq!(options.key_mgmt, "NONE");
        assert!(profile.static_ip.is_none());
    }

    #[test]
    fn test_set_used_clears_every_other_profile() {
        let mut store = ConnectionStore {
            wifi: vec![],
            eth: vec![eth("a", true), eth("b", false), eth("c", true)],
        };

        assert!(store.set_used("b", true));

        assert!(store.eth.iter().filter(|c| c.id != "b").all(|c| !c.is_used));
        assert!(store.eth.iter().find(|c| c.id == "b").unwrap().is_used);
        assert_eq!(store.used_eth().unwrap().id, "b");
    }

    #[test]
    fn test_set_used_unknown_id_changes_nothing() {
        let mut store = ConnectionStore {
            wifi: vec![],
            eth: vec![eth("a", true)],
        };

        assert!(!store.set_used("missing", true));
        assert!(store.eth[0].is_used);
    }

    #[test]
    fn test_remove_returns_profile() {
        let mut store = ConnectionStore {
            wifi: vec![],
            eth: vec![eth("a", false), eth("b", false)],
        };

        let removed = store.remove(ConnectionKind::Eth, "a").unwrap();
        assert_eq!(removed.id(), "a");
        assert_eq!(store.eth.len(), 1);
        assert!(store.remove(ConnectionKind::Eth, "a").is_none());
    }
}
