//! This module provides the network setup workflows of the device.
//!
//! `NetSetupController` combines the connection store, the OS config files,
//! the interface controller, the reachability validator and the remote
//! server into the connect, store, delete and sync workflows. Each workflow
//! runs to completion; callers serialize them through `SetupQueue`.

mod connect;
mod context;
mod delete;
mod device_action;
mod sync;
mod workflow;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::time::sleep;

pub use context::NetContext;
pub use workflow::{
    plan_delete_all, DeletionPlan, RequestOrigin, WorkflowOutcome,
    WorkflowState,
};

use crate::{
    config::{DeviceConfig, TimingConfig},
    error::Result,
    net_check::{await_convergence, ConvergencePolicy, PingReport, ReachabilityOps},
    net_ctl::{NetIfCtl, ScannedNetwork},
    net_data::{ConnectionKind, ConnectionStoreOps, NetworkSetupId, Profile},
    os_config::OsConfigOps,
    remote_api::{DeviceAction, NetworkLog, NetworkSetupApi, NetworkSetupRequest, SetupType},
};

#[cfg(test)]
use mockall::automock;

/// The network setup workflows.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetSetupOps: Send + 'static {
    /// Runs the connect or store workflow the request asks for.
    async fn apply_network_setup(
        &mut self, request: NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome>;

    async fn handle_device_action(
        &mut self, action: DeviceAction,
    ) -> Result<WorkflowOutcome>;

    /// Reconciles the local store with the server.
    async fn sync(&mut self) -> Result<WorkflowOutcome>;

    async fn delete_one(
        &mut self, kind: ConnectionKind, id: &str, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome>;

    async fn delete_all(&mut self) -> Result<WorkflowOutcome>;

    async fn change_country(&mut self, code: &str) -> Result<WorkflowOutcome>;

    async fn scan_wifi(&mut self) -> Result<Vec<ScannedNetwork>>;

    /// Re-applies the stored ethernet setup at start-up.
    async fn boot_checkup(&mut self) -> Result<WorkflowOutcome>;
}

/// Struct representing the network setup controller.
pub struct NetSetupController<S, O, I, V, A> {
    store: S,
    os_config: O,
    net_if: I,
    validator: V,
    api: A,
    device: DeviceConfig,
    timings: TimingConfig,
    state: WorkflowState,
}

impl<S, O, I, V, A> NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    pub fn new(
        store: S, os_config: O, net_if: I, validator: V, api: A,
        device: DeviceConfig, timings: TimingConfig,
    ) -> Self {
        Self {
            store,
            os_config,
            net_if,
            validator,
            api,
            device,
            timings,
            state: WorkflowState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Captures the live network state.
    pub async fn context(&self) -> Result<NetContext> {
        NetContext::capture(&self.net_if, &self.store, &self.device).await
    }

    fn enter(&mut self, state: WorkflowState) {
        debug!("Workflow state {} -> {}", self.state, state);
        self.state = state;
    }

    /// Returns to idle once a workflow ended, however it ended.
    fn done(&mut self, result: Result<WorkflowOutcome>) -> Result<WorkflowOutcome> {
        self.enter(WorkflowState::Idle);
        match &result {
            Ok(outcome) => info!("Workflow finished: {:?}", outcome),
            Err(e) => error!("Workflow aborted, error: {}", e),
        }
        result
    }

    fn wifi_if(&self) -> String {
        self.device.wifi_interface.clone()
    }

    fn eth_if(&self) -> String {
        self.device.eth_interface.clone()
    }

    async fn settle(&self, secs: u64) {
        if secs > 0 {
            info!("Waiting {}s for the network to settle", secs);
        }
        sleep(TimingConfig::secs(secs)).await;
    }

    /// Waits up to `secs` for `iface` to become reachable.
    async fn converge(&self, iface: &str, secs: u64) -> PingReport {
        let policy = ConvergencePolicy::new(
            TimingConfig::secs(secs),
            TimingConfig::secs(self.timings.convergence_poll_secs),
        );
        await_convergence(&self.validator, iface, policy).await
    }

    async fn interface_up(&self, iface: &str) {
        if let Err(e) = self.net_if.interface_up(iface).await {
            error!("Failed to turn on {}, error: {}", iface, e);
        }
    }

    async fn interface_down(&self, iface: &str) {
        if let Err(e) = self.net_if.interface_down(iface).await {
            error!("Failed to turn off {}, error: {}", iface, e);
        }
    }

    async fn restart_network(&self) {
        if let Err(e) = self.net_if.restart_network_service().await {
            error!("Failed to restart networking, error: {}", e);
        }
    }

    async fn reconfigure_wifi(&self) {
        if let Err(e) = self.net_if.reconfigure_wifi().await {
            error!("Failed to reconfigure supplicant, error: {}", e);
        }
    }

    /// Puts the backed up files back and reloads the networking.
    async fn restore_backups(&self) {
        if let Err(e) = self.os_config.restore() {
            error!("Failed to restore network configuration, error: {}", e);
        }
        self.reconfigure_wifi().await;
        self.restart_network().await;
    }

    /// Registers a local profile with the server and stores the assigned
    /// setup id. Failures leave the id unset.
    async fn register(&self, profile: &Profile, setup_type: SetupType) {
        let setup_id = match self.api.set_network_setup(profile, setup_type).await {
            Ok(Some(setup_id)) => setup_id,
            Ok(None) => {
                warn!("Server assigned no setup id to {}", profile.id());
                return;
            }
            Err(e) => {
                error!("Failed to register connection {}, error: {}", profile.id(), e);
                return;
            }
        };

        info!("Connection {} registered as setup {}", profile.id(), setup_id);
        if let Err(e) = self.store.set_network_setup_id(
            profile.kind(),
            profile.id(),
            Some(setup_id),
        ) {
            error!("Failed to store setup id {}, error: {}", setup_id, e);
        }
    }

    /// Sends a status line to the server log, with the addresses of the
    /// device attached.
    async fn report(&self, message: String, setup_id: Option<NetworkSetupId>) {
        let wifi_if = self.wifi_if();
        let eth_if = self.eth_if();
        let log = NetworkLog {
            wifi_mac: self.net_if.mac_address(&wifi_if).await.ok(),
            eth_ip: self.net_if.ip_address(&eth_if).await.ok().flatten(),
            wifi_ip: self.net_if.ip_address(&wifi_if).await.ok().flatten(),
            network_setup_id: setup_id,
            ..NetworkLog::new(message)
        };

        if let Err(e) = self.api.insert_log(&log).await {
            warn!("Failed to send network log, error: {}", e);
        }
    }
}

fn kind_label(kind: ConnectionKind) -> &'static str {
    match kind {
        ConnectionKind::Wifi => "WiFi",
        ConnectionKind::Eth => "Ethernet",
    }
}

fn connected_message(kind: ConnectionKind, name: &str, ip: Option<&str>) -> String {
    format!(
        "Successfully connected to {} network {} with IP address: {}!",
        kind_label(kind),
        name,
        ip.unwrap_or("unknown")
    )
}

fn connect_error_message(kind: ConnectionKind, name: &str) -> String {
    format!("Error on connecting to {} network {}!", kind_label(kind), name)
}

fn stored_message(kind: ConnectionKind, name: &str) -> String {
    format!("Successfully stored {} network {}!", kind_label(kind), name)
}

const SETUP_APPLIED_MESSAGE: &str =
    "Successfully downloaded and applied new network setup!";
const SETUP_FAILED_MESSAGE: &str = "Error on downloading or applying network setup!";

#[async_trait]
impl<S, O, I, V, A> NetSetupOps for NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    async fn apply_network_setup(
        &mut self, request: NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        info!(
            "Applying {:?} setup for {} from {:?}",
            request.setup_type,
            request.display_name(),
            origin
        );
        if let Err(e) = request.validate() {
            error!("Refusing {} setup, error: {}", request.display_name(), e);
            return Ok(WorkflowOutcome::Refused);
        }
        let result = match request.setup_type {
            SetupType::WifiConnect => self.connect_wifi(&request, origin).await,
            SetupType::EthConnect => self.connect_eth(&request, origin).await,
            SetupType::WifiStore => self.store_wifi(&request, origin).await,
            SetupType::EthStore => self.store_eth(&request, origin).await,
        };
        self.done(result)
    }

    async fn handle_device_action(
        &mut self, action: DeviceAction,
    ) -> Result<WorkflowOutcome> {
        let result = self.dispatch_action(action).await;
        self.done(result)
    }

    async fn sync(&mut self) -> Result<WorkflowOutcome> {
        let result = self.sync_with_server().await;
        self.done(result)
    }

    async fn delete_one(
        &mut self, kind: ConnectionKind, id: &str, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let result = self.delete_connection(kind, id, origin).await;
        self.done(result)
    }

    async fn delete_all(&mut self) -> Result<WorkflowOutcome> {
        let result = match self.context().await {
            Ok(ctx) => self.delete_all_with(&ctx).await,
            Err(e) => Err(e),
        };
        self.done(result)
    }

    async fn change_country(&mut self, code: &str) -> Result<WorkflowOutcome> {
        info!("Changing wifi country to {}", code);
        self.enter(WorkflowState::Applying);
        let result = self.os_config.set_country(code);
        if result.is_ok() {
            self.reconfigure_wifi().await;
            self.restart_network().await;
        }
        self.done(result.map(|_| WorkflowOutcome::Stored))
    }

    async fn scan_wifi(&mut self) -> Result<Vec<ScannedNetwork>> {
        self.net_if.scan_wifi().await
    }

    async fn boot_checkup(&mut self) -> Result<WorkflowOutcome> {
        let result = self.check_up().await;
        self.done(result)
    }
}
