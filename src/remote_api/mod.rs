//! This module is the client of the remote network setup server.
//!
//! Every request is form encoded and carries the device identity as `mac`.
//! Responses share the `{status, message, data}` envelope, `status` 0 is a
//! success.

pub mod wire;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;

pub use wire::{
    DeviceAction, NetworkLog, NetworkSetupRecord, NetworkSetupRequest,
    OutgoingSetup, SetupType,
};

use crate::{
    config::ApiConfig,
    error::{NetError, Result},
    net_data::{ConnectionStore, NetworkSetupId, Profile},
};
use wire::{to_form_pairs, ApiResponse};

#[cfg(test)]
use mockall::automock;

/// Status of a successful response.
pub const STATUS_OK: i64 = 0;
/// Status of a sync response that only updates the local store.
pub const STATUS_STORE_ONLY: i64 = 1;

const INSERT_LOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of pushing the local store to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The returned set replaces the store and the OS configuration.
    FullReplace(Vec<NetworkSetupRequest>),
    /// The returned set replaces the store only.
    StoreOnly(Vec<NetworkSetupRequest>),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkSetupApi: Send + Sync + 'static {
    /// The pending network setup of this device, if any.
    async fn get_network_setup(&self) -> Result<Option<NetworkSetupRequest>>;

    /// Registers a profile, returns the assigned setup id.
    async fn set_network_setup(
        &self, profile: &Profile, setup_type: SetupType,
    ) -> Result<Option<NetworkSetupId>>;

    async fn delete_network_setup(&self, id: NetworkSetupId) -> Result<()>;

    /// Pushes the whole local store, returns the canonical set.
    async fn sync_networks(&self, store: &ConnectionStore) -> Result<SyncOutcome>;

    /// Tells the server which setups survived a delete-all.
    async fn after_delete_all_networks(&self, ids_to_keep: &[NetworkSetupId])
        -> Result<()>;

    async fn get_device_action(&self) -> Result<Option<DeviceAction>>;

    /// The pending scheduled restart of the device, if any.
    async fn get_restart_action(&self) -> Result<Option<Value>>;

    async fn insert_log(&self, log: &NetworkLog) -> Result<()>;
}

/// `NetworkSetupApi` over HTTPS.
#[derive(Clone)]
pub struct HttpNetworkApi {
    client: Client,
    base_url: String,
    device_id: String,
}

impl HttpNetworkApi {
    pub fn new(config: &ApiConfig, device_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn params(&self, mut extra: Vec<(String, String)>) -> Vec<(String, String)> {
        extra.insert(0, ("mac".to_string(), self.device_id.clone()));
        extra
    }

    async fn get(
        &self, endpoint: &str, extra: Vec<(String, String)>,
    ) -> Result<ApiResponse> {
        let request = self.client.get(self.url(endpoint)).query(&self.params(extra));
        self.send(endpoint, request).await
    }

    async fn post(
        &self, endpoint: &str, extra: Vec<(String, String)>,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse> {
        let mut request = self.client.post(self.url(endpoint)).form(&self.params(extra));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.send(endpoint, request).await
    }

    async fn send(
        &self, endpoint: &str, request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse> {
        debug!("Calling {}", endpoint);
        let response = request
            .send()
            .await
            .map_err(|e| NetError::RemoteApi(format!("{}: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(NetError::RemoteApi(format!(
                "{}: http status {}",
                endpoint,
                response.status()
            ))
            .into());
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| NetError::RemoteApi(format!("{}: {}", endpoint, e)).into())
    }
}

/// Checks the envelope status, `accepted` lists the tolerated codes.
fn check_status(
    endpoint: &str, response: &ApiResponse, accepted: &[i64],
) -> Result<()> {
    if accepted.contains(&response.status) {
        return Ok(());
    }
    Err(NetError::RemoteApi(format!(
        "{}: status {}, {}",
        endpoint,
        response.status,
        response.message.as_deref().unwrap_or("no message")
    ))
    .into())
}

/// The data field, `None` when absent or empty.
fn non_empty_data(response: ApiResponse) -> Option<Value> {
    match response.data {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(data) => Some(data),
    }
}

/// Parses a list of server records, unusable records are skipped.
pub fn requests_from_data(data: Option<Value>) -> Vec<NetworkSetupRequest> {
    let items = match data {
        Some(Value::Array(items)) => items,
        Some(item @ Value::Object(_)) => vec![item],
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| {
            let record = serde_json::from_value::<NetworkSetupRecord>(item)
                .map_err(|e| warn!("Skipping malformed network setup, error: {}", e))
                .ok()?;
            NetworkSetupRequest::from_record(record)
                .map_err(|e| warn!("Skipping network setup, error: {}", e))
                .ok()
        })
        .collect()
}

/// The local store in the form the sync endpoint expects.
pub fn sync_payload(store: &ConnectionStore) -> Result<String> {
    let setups: Vec<OutgoingSetup> = store
        .wifi
        .iter()
        .cloned()
        .map(Profile::Wifi)
        .chain(store.eth.iter().cloned().map(Profile::Eth))
        .map(|profile| {
            OutgoingSetup::from_profile(&profile, SetupType::store_of(profile.kind()))
        })
        .collect();
    Ok(serde_json::to_string(&setups)?)
}

fn setup_id_from_data(data: Option<&Value>) -> Option<NetworkSetupId> {
    wire::setup_id_from(data?.get("networkSetupId"))
}

#[async_trait]
impl NetworkSetupApi for HttpNetworkApi {
    async fn get_network_setup(&self) -> Result<Option<NetworkSetupRequest>> {
        let response = self.get("getNetworkSetup", Vec::new()).await?;
        check_status("getNetworkSetup", &response, &[STATUS_OK])?;

        let Some(data) = non_empty_data(response) else {
            return Ok(None);
        };
        let record: NetworkSetupRecord = serde_json::from_value(data)
            .map_err(|e| NetError::RemoteApi(format!("getNetworkSetup: {}", e)))?;
        Ok(Some(NetworkSetupRequest::from_record(record)?))
    }

    async fn set_network_setup(
        &self, profile: &Profile, setup_type: SetupType,
    ) -> Result<Option<NetworkSetupId>> {
        info!("Registering {:?} connection {}", profile.kind(), profile.id());
        let setup = OutgoingSetup::from_profile(profile, setup_type);
        let response = self
            .post("setNetworkSetup", to_form_pairs(&setup)?, None)
            .await?;
        check_status("setNetworkSetup", &response, &[STATUS_OK])?;
        Ok(setup_id_from_data(response.data.as_ref()))
    }

    async fn delete_network_setup(&self, id: NetworkSetupId) -> Result<()> {
        info!("Deregistering network setup {}", id);
        let response = self
            .get(
                "deleteNetworkSetup",
                vec![("networkSetupId".to_string(), id.to_string())],
            )
            .await?;
        check_status("deleteNetworkSetup", &response, &[STATUS_OK])
    }

    async fn sync_networks(&self, store: &ConnectionStore) -> Result<SyncOutcome> {
        let payload = sync_payload(store)?;
        let response = self
            .post(
                "syncNetworks",
                vec![("currentDeviceNetworks".to_string(), payload)],
                None,
            )
            .await?;
        check_status("syncNetworks", &response, &[STATUS_OK, STATUS_STORE_ONLY])?;

        let status = response.status;
        let requests = requests_from_data(response.data);
        info!("Sync returned {} network(s), status {}", requests.len(), status);
        Ok(if status == STATUS_OK {
            SyncOutcome::FullReplace(requests)
        } else {
            SyncOutcome::StoreOnly(requests)
        })
    }

    async fn after_delete_all_networks(
        &self, ids_to_keep: &[NetworkSetupId],
    ) -> Result<()> {
        let ids = serde_json::to_string(ids_to_keep)?;
        let response = self
            .post(
                "afterDeleteAllNetworks",
                vec![("doNotDeleteNetworksWithId".to_string(), ids)],
                None,
            )
            .await?;
        check_status("afterDeleteAllNetworks", &response, &[STATUS_OK])
    }

    async fn get_device_action(&self) -> Result<Option<DeviceAction>> {
        let response = self
            .get(
                "getDeviceAction",
                vec![("doNotSendRestart".to_string(), "true".to_string())],
            )
            .await?;
        check_status("getDeviceAction", &response, &[STATUS_OK])?;

        match non_empty_data(response) {
            Some(data) => Ok(Some(DeviceAction::from_value(data)?)),
            None => Ok(None),
        }
    }

    async fn get_restart_action(&self) -> Result<Option<Value>> {
        let response = self.get("getRestartAction", Vec::new()).await?;
        check_status("getRestartAction", &response, &[STATUS_OK])?;
        Ok(non_empty_data(response))
    }

    async fn insert_log(&self, log: &NetworkLog) -> Result<()> {
        let response = self
            .post("insertLog", to_form_pairs(log)?, Some(INSERT_LOG_TIMEOUT))
            .await?;
        check_status("insertLog", &response, &[STATUS_OK])
    }
}
