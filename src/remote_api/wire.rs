//! Wire formats of the remote network setup server.
//!
//! Incoming setups carry `networkType` (1 ethernet, 2 Wi-Fi) and
//! `setupAction` (1 connect, 2 store); the encryption arrives as an object
//! with a `type` field. Outgoing setups carry the encryption options as a
//! JSON string.

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    error::Result,
    net_data::{
        ConnectionKind, Encryption, EncryptionOptions, EthProfile,
        NetworkSetupId, Profile, StaticIp, WifiProfile, PREFERRED_PRIORITY,
    },
};

pub const NETWORK_TYPE_ETH: u8 = 1;
pub const NETWORK_TYPE_WIFI: u8 = 2;
pub const SETUP_ACTION_CONNECT: u8 = 1;
pub const SETUP_ACTION_STORE: u8 = 2;

/// Log type of the network related entries of `/insertLog`.
pub const LOG_TYPE_NETWORK: u8 = 4;

/// Envelope of every response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// What a network setup asks the device to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupType {
    WifiConnect,
    WifiStore,
    EthConnect,
    EthStore,
}

impl SetupType {
    pub fn from_wire(network_type: u8, setup_action: u8) -> Option<Self> {
        match (network_type, setup_action) {
            (NETWORK_TYPE_WIFI, SETUP_ACTION_CONNECT) => Some(Self::WifiConnect),
            (NETWORK_TYPE_WIFI, SETUP_ACTION_STORE) => Some(Self::WifiStore),
            (NETWORK_TYPE_ETH, SETUP_ACTION_CONNECT) => Some(Self::EthConnect),
            (NETWORK_TYPE_ETH, SETUP_ACTION_STORE) => Some(Self::EthStore),
            _ => None,
        }
    }

    pub fn store_of(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::Wifi => Self::WifiStore,
            ConnectionKind::Eth => Self::EthStore,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            Self::WifiConnect | Self::WifiStore => ConnectionKind::Wifi,
            Self::EthConnect | Self::EthStore => ConnectionKind::Eth,
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Self::WifiConnect | Self::EthConnect)
    }

    pub fn network_type(&self) -> u8 {
        match self.kind() {
            ConnectionKind::Wifi => NETWORK_TYPE_WIFI,
            ConnectionKind::Eth => NETWORK_TYPE_ETH,
        }
    }

    pub fn setup_action(&self) -> u8 {
        if self.is_connect() {
            SETUP_ACTION_CONNECT
        } else {
            SETUP_ACTION_STORE
        }
    }
}

/// Reads a setup id sent as a number or as a numeric string.
pub fn setup_id_from(value: Option<&Value>) -> Option<NetworkSetupId> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_setup_id<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NetworkSetupId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(setup_id_from(value.as_ref()))
}

/// A network setup as the server sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSetupRecord {
    #[serde(deserialize_with = "lenient_setup_id")]
    pub id: Option<NetworkSetupId>,
    pub network_type: Option<u8>,
    pub setup_action: Option<u8>,
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub country_locale: Option<String>,
    pub has_static_ip: Option<bool>,
    pub ip_address: Option<String>,
    pub subnet_mask: Option<String>,
    pub default_gateway: Option<String>,
    pub preferred_dns: Option<String>,
    pub alternative_dns: Option<String>,
    pub encryption: Option<Value>,
}

/// A connect or store request, from the server or the local UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSetupRequest {
    pub setup_type: SetupType,
    pub network_setup_id: Option<NetworkSetupId>,
    pub ssid: String,
    pub password: String,
    pub encryption: Encryption,
    pub encryption_options: Option<EncryptionOptions>,
    pub priority: u32,
    pub country_locale: Option<String>,
    pub static_ip: Option<StaticIp>,
}

/// Reads the `encryption` field, which is an options object or the same
/// object serialized as a string.
fn parse_encryption(value: &Value) -> (Encryption, Option<EncryptionOptions>) {
    let value = match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed,
            Err(_) => return (Encryption::Open, None),
        },
        other => other.clone(),
    };

    let kind = value
        .get("type")
        .cloned()
        .and_then(|kind| serde_json::from_value::<Encryption>(kind).ok())
        .unwrap_or_default();
    let options = serde_json::from_value::<EncryptionOptions>(value).ok();
    (kind, options)
}

impl NetworkSetupRequest {
    pub fn from_record(record: NetworkSetupRecord) -> Result<Self> {
        let setup_type = SetupType::from_wire(
            record.network_type.unwrap_or_default(),
            record.setup_action.unwrap_or_default(),
        )
        .ok_or_else(|| {
            anyhow!(
                "unknown network setup type {:?}/{:?}",
                record.network_type,
                record.setup_action
            )
        })?;

        let (encryption, options) = match &record.encryption {
            Some(value) if !value.is_null() => parse_encryption(value),
            _ => (Encryption::Open, None),
        };
        let encryption_options = Some(
            options.unwrap_or_else(|| EncryptionOptions::defaults_for(encryption)),
        );

        let static_ip = match record.has_static_ip {
            Some(true) => Some(StaticIp {
                ip_address: record.ip_address.unwrap_or_default(),
                subnet_mask: record.subnet_mask.unwrap_or_default(),
                default_gateway: record.default_gateway.unwrap_or_default(),
                preferred_dns: record.preferred_dns.unwrap_or_default(),
                alternative_dns: record.alternative_dns.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            setup_type,
            network_setup_id: record.id,
            ssid: record.ssid.unwrap_or_default(),
            password: record.password.unwrap_or_default(),
            encryption,
            encryption_options,
            priority: PREFERRED_PRIORITY,
            country_locale: record.country_locale.filter(|c| !c.is_empty()),
            static_ip,
        })
    }

    pub fn to_wifi_profile(&self, id: &str) -> WifiProfile {
        WifiProfile {
            id: id.to_string(),
            network_setup_id: self.network_setup_id,
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            encryption: self.encryption,
            encryption_options: Some(
                self.encryption_options
                    .clone()
                    .unwrap_or_else(|| EncryptionOptions::defaults_for(self.encryption)),
            ),
            priority: self.priority,
            static_ip: self.static_ip.clone(),
        }
    }

    /// Checks that the request can be stored and written to the config
    /// files. Quotes and control characters would end the quoted supplicant
    /// values early, so they are refused.
    pub fn validate(&self) -> Result<()> {
        match self.setup_type.kind() {
            ConnectionKind::Wifi => {
                if self.ssid.is_empty() {
                    return Err(anyhow!("wifi setup without ssid"));
                }
                check_quotable("ssid", &self.ssid)?;
                check_quotable("password", &self.password)?;
            }
            ConnectionKind::Eth if self.static_ip.is_none() => {
                return Err(anyhow!("ethernet setup without static settings"));
            }
            ConnectionKind::Eth => {}
        }

        match &self.static_ip {
            Some(static_ip) => static_ip.validate(),
            None => Ok(()),
        }
    }

    /// Ethernet profiles are always static, a setup without valid static
    /// settings is rejected.
    pub fn to_eth_profile(&self, id: &str) -> Result<EthProfile> {
        let static_ip = self
            .static_ip
            .clone()
            .ok_or_else(|| anyhow!("ethernet setup without static settings"))?;
        static_ip.validate()?;
        Ok(EthProfile {
            id: id.to_string(),
            network_setup_id: self.network_setup_id,
            is_used: true,
            static_ip,
        })
    }

    /// Name shown in the status logs.
    pub fn display_name(&self) -> &str {
        match (self.setup_type.kind(), &self.static_ip) {
            (ConnectionKind::Eth, Some(static_ip)) => &static_ip.ip_address,
            _ => &self.ssid,
        }
    }
}

fn check_quotable(field: &str, value: &str) -> Result<()> {
    if value.chars().any(|c| c == '"' || c.is_control()) {
        return Err(anyhow!("{} contains a quote or control character", field));
    }
    Ok(())
}

/// A setup as the device sends it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingSetup {
    pub network_type: u8,
    pub setup_action: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_setup_id: Option<NetworkSetupId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub has_static_ip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_dns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_dns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
}

impl OutgoingSetup {
    pub fn from_profile(profile: &Profile, setup_type: SetupType) -> Self {
        let (static_ip, mut setup) = match profile {
            Profile::Wifi(wifi) => (
                wifi.static_ip.as_ref(),
                Self {
                    ssid: Some(wifi.ssid.clone()),
                    password: Some(wifi.password.clone()),
                    encryption: serde_json::to_string(&wifi.effective_options())
                        .ok(),
                    ..Default::default()
                },
            ),
            Profile::Eth(eth) => (Some(&eth.static_ip), Self::default()),
        };

        setup.network_type = setup_type.network_type();
        setup.setup_action = setup_type.setup_action();
        setup.network_setup_id = profile.network_setup_id();
        if let Some(static_ip) = static_ip {
            setup.has_static_ip = true;
            setup.ip_address = Some(static_ip.ip_address.clone());
            setup.subnet_mask = Some(static_ip.subnet_mask.clone());
            setup.default_gateway = Some(static_ip.default_gateway.clone());
            setup.preferred_dns = Some(static_ip.preferred_dns.clone());
            setup.alternative_dns = Some(static_ip.alternative_dns.clone());
        }
        setup
    }
}

/// Flattens a serializable struct into form fields, nulls are skipped.
pub fn to_form_pairs<T: Serialize>(value: &T) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = serde_json::to_value(value)? else {
        return Err(anyhow!("form data must be an object"));
    };

    Ok(map
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

/// A device action concerning the network setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    DeleteNetworks,
    DeleteNetwork { kind: ConnectionKind, network_setup_id: NetworkSetupId },
    ConnectToNetwork { kind: ConnectionKind, network_setup_id: NetworkSetupId },
    /// Any action handled outside of the network setup.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawDeviceAction {
    name: String,
    #[serde(default)]
    data: Option<Value>,
}

fn kind_from_network_type(value: Option<&Value>) -> Option<ConnectionKind> {
    match value?.as_str()? {
        "WiFi" => Some(ConnectionKind::Wifi),
        "Ethernet" => Some(ConnectionKind::Eth),
        _ => None,
    }
}

impl DeviceAction {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawDeviceAction = serde_json::from_value(value)?;
        let data = raw.data.unwrap_or(Value::Null);
        let target = || -> Result<(ConnectionKind, NetworkSetupId)> {
            let kind = kind_from_network_type(data.get("networkType"))
                .ok_or_else(|| anyhow!("action {} without network type", raw.name))?;
            let id = setup_id_from(data.get("networkSetupId"))
                .ok_or_else(|| anyhow!("action {} without setup id", raw.name))?;
            Ok((kind, id))
        };

        Ok(match raw.name.as_str() {
            "deleteNetworks" => DeviceAction::DeleteNetworks,
            "deleteNetwork" => {
                let (kind, network_setup_id) = target()?;
                DeviceAction::DeleteNetwork { kind, network_setup_id }
            }
            "connectToNetwork" => {
                let (kind, network_setup_id) = target()?;
                DeviceAction::ConnectToNetwork { kind, network_setup_id }
            }
            _ => DeviceAction::Other(raw.name.clone()),
        })
    }
}

/// A network entry of `/insertLog`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLog {
    pub log_type: u8,
    pub log_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_setup_id: Option<NetworkSetupId>,
}

impl NetworkLog {
    pub fn new(log_string: impl Into<String>) -> Self {
        Self {
            log_type: LOG_TYPE_NETWORK,
            log_string: log_string.into(),
            ..Default::default()
        }
    }
}
