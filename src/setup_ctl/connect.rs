//! Connect and store workflows.
//!
//! A connect backs up the config files, applies the candidate, waits for the
//! network to settle and keeps the candidate only if both probe targets
//! answer. Anything else puts the backups back. A store applies the profile
//! without validating it.

use log::{error, info, warn};
use uuid::Uuid;

use super::{
    connect_error_message, connected_message, stored_message,
    NetSetupController, RequestOrigin, WorkflowOutcome, WorkflowState,
};
use crate::{
    error::{NetError, Result},
    net_check::ReachabilityOps,
    net_ctl::NetIfCtl,
    net_data::{
        ConnectionKind, ConnectionStore, ConnectionStoreOps, EthProfile,
        NetworkSetupId, Profile, WifiProfile, PREFERRED_PRIORITY,
    },
    os_config::{OsConfigOps, StanzaMarker},
    remote_api::{NetworkSetupApi, NetworkSetupRequest, SetupType},
};

impl<S, O, I, V, A> NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    pub(super) async fn connect_wifi(
        &mut self, request: &NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let snapshot = self.store.load()?;
        let wifi_if = self.wifi_if();
        let candidate = request.to_wifi_profile(&Uuid::new_v4().to_string());
        let marker = StanzaMarker::Ssid(candidate.ssid.clone());
        info!("Connecting to wifi network {}", candidate.ssid);

        self.enter(WorkflowState::BackingUp);
        if let Err(e) = self.os_config.backup() {
            error!("Failed to back up network configuration, error: {}", e);
            return Ok(WorkflowOutcome::Skipped);
        }

        self.enter(WorkflowState::Applying);
        if let Err(e) = self
            .apply_wifi_candidate(&candidate, request.country_locale.clone())
            .await
        {
            error!("Failed to apply wifi network {}, error: {}", candidate.ssid, e);
            return Ok(self
                .fail_connect(ConnectionKind::Wifi, &candidate.ssid, &snapshot, &marker, request)
                .await);
        }

        self.enter(WorkflowState::Settling);
        let report = self.converge(&wifi_if, self.timings.connect_settle_secs).await;
        self.enter(WorkflowState::Validating);
        if !report.is_reachable() {
            warn!("{} for {}: {:?}", NetError::unreachable(&wifi_if), candidate.ssid, report);
            return Ok(self
                .fail_connect(ConnectionKind::Wifi, &candidate.ssid, &snapshot, &marker, request)
                .await);
        }

        self.enter(WorkflowState::Committed);
        // the candidate was rendered alone, list every stored network again
        match self.store.load() {
            Ok(store) => {
                if let Err(e) = self.os_config.render_supplicant(&store.wifi, None) {
                    error!("Failed to render supplicant file, error: {}", e);
                }
            }
            Err(e) => error!("Failed to reload connections, error: {}", e),
        }

        let ip = self.net_if.ip_address(&wifi_if).await.ok().flatten();
        let setup_id = self
            .commit_registration(Profile::Wifi(candidate.clone()), SetupType::WifiConnect, origin)
            .await;
        self.report(
            connected_message(ConnectionKind::Wifi, &candidate.ssid, ip.as_deref()),
            setup_id,
        )
        .await;
        Ok(WorkflowOutcome::Committed)
    }

    /// Makes the candidate the preferred network and the only one the
    /// supplicant knows until it is validated.
    async fn apply_wifi_candidate(
        &self, candidate: &WifiProfile, country: Option<String>,
    ) -> Result<()> {
        self.store.reset_all_priorities()?;
        self.store.add_wifi(candidate.clone())?;
        self.os_config
            .render_supplicant(std::slice::from_ref(candidate), country)?;
        if let Some(static_ip) = &candidate.static_ip {
            self.os_config.append_dhcp_stanza(
                &StanzaMarker::Ssid(candidate.ssid.clone()),
                static_ip,
            )?;
        }

        self.net_if.reconfigure_wifi().await?;
        self.restart_network().await;
        Ok(())
    }

    pub(super) async fn connect_eth(
        &mut self, request: &NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let snapshot = self.store.load()?;
        let eth_if = self.eth_if();
        let candidate = match request.to_eth_profile(&Uuid::new_v4().to_string()) {
            Ok(candidate) => candidate,
            Err(e) => {
                error!("Refusing ethernet setup, error: {}", e);
                return Ok(WorkflowOutcome::Refused);
            }
        };
        let name = candidate.static_ip.ip_address.clone();
        let marker = StanzaMarker::Interface(eth_if.clone());
        info!("Connecting to ethernet network {}", name);

        self.enter(WorkflowState::BackingUp);
        if let Err(e) = self.os_config.backup() {
            error!("Failed to back up network configuration, error: {}", e);
            return Ok(WorkflowOutcome::Skipped);
        }

        self.enter(WorkflowState::Applying);
        if let Err(e) = self.apply_eth_candidate(&candidate, &marker).await {
            error!("Failed to apply ethernet network {}, error: {}", name, e);
            return Ok(self
                .fail_connect(ConnectionKind::Eth, &name, &snapshot, &marker, request)
                .await);
        }

        self.enter(WorkflowState::Settling);
        let report = self.converge(&eth_if, self.timings.eth_settle_secs).await;
        self.enter(WorkflowState::Validating);
        if !report.is_reachable() {
            warn!("{} for {}: {:?}", NetError::unreachable(&eth_if), name, report);
            return Ok(self
                .fail_connect(ConnectionKind::Eth, &name, &snapshot, &marker, request)
                .await);
        }

        self.enter(WorkflowState::Committed);
        let ip = self.net_if.ip_address(&eth_if).await.ok().flatten();
        let setup_id = self
            .commit_registration(Profile::Eth(candidate), SetupType::EthConnect, origin)
            .await;
        self.report(
            connected_message(ConnectionKind::Eth, &name, ip.as_deref()),
            setup_id,
        )
        .await;
        Ok(WorkflowOutcome::Committed)
    }

    /// Replaces the ethernet stanza with the one of `candidate`.
    async fn apply_eth_candidate(
        &self, candidate: &EthProfile, marker: &StanzaMarker,
    ) -> Result<()> {
        candidate.static_ip.validate()?;
        self.os_config.remove_dhcp_stanza(marker)?;
        self.store.add_eth(candidate.clone())?;
        self.os_config.append_dhcp_stanza(marker, &candidate.static_ip)?;
        self.restart_network().await;
        Ok(())
    }

    async fn fail_connect(
        &mut self, kind: ConnectionKind, name: &str, snapshot: &ConnectionStore,
        marker: &StanzaMarker, request: &NetworkSetupRequest,
    ) -> WorkflowOutcome {
        self.enter(WorkflowState::RollingBack);
        let iface = match kind {
            ConnectionKind::Wifi => self.wifi_if(),
            ConnectionKind::Eth => self.eth_if(),
        };
        self.roll_back_connect(&iface, snapshot, marker).await;
        self.report(connect_error_message(kind, name), request.network_setup_id)
            .await;
        WorkflowOutcome::RolledBack
    }

    /// Brings back the configuration from before the connect.
    async fn roll_back_connect(
        &self, iface: &str, snapshot: &ConnectionStore, marker: &StanzaMarker,
    ) {
        warn!("Rolling back the connection on {}", iface);
        self.interface_down(iface).await;
        if let Err(e) = self.os_config.restore() {
            error!(
                "Failed to restore network configuration, undoing the change instead, error: {}",
                e
            );
            self.undo_connect(snapshot, marker);
        }
        self.interface_up(iface).await;
        self.reconfigure_wifi().await;
        self.restart_network().await;
        self.settle(self.timings.rollback_settle_secs).await;
    }

    /// Rebuilds the files from the store as it was before the connect.
    fn undo_connect(&self, snapshot: &ConnectionStore, marker: &StanzaMarker) {
        if let Err(e) = self.store.save(snapshot) {
            error!("Failed to restore connections, error: {}", e);
        }
        if let Err(e) = self.os_config.render_supplicant(&snapshot.wifi, None) {
            error!("Failed to render supplicant file, error: {}", e);
        }
        if let Err(e) = self.os_config.remove_dhcp_stanza(marker) {
            error!("Failed to remove dhcpcd stanza, error: {}", e);
        }
        if let (StanzaMarker::Interface(_), Some(used)) = (marker, snapshot.used_eth())
        {
            if let Err(e) = self.os_config.append_dhcp_stanza(marker, &used.static_ip) {
                error!("Failed to restore ethernet stanza, error: {}", e);
            }
        }
    }

    /// Registers local profiles, returns the setup id the profile ends up
    /// with.
    async fn commit_registration(
        &self, profile: Profile, setup_type: SetupType, origin: RequestOrigin,
    ) -> Option<NetworkSetupId> {
        if origin == RequestOrigin::Local {
            self.register(&profile, setup_type).await;
        }
        self.store
            .find_by_id(profile.kind(), profile.id())
            .ok()
            .flatten()
            .and_then(|stored| stored.network_setup_id())
    }

    pub(super) async fn store_wifi(
        &mut self, request: &NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let profile = request.to_wifi_profile(&Uuid::new_v4().to_string());
        info!("Storing wifi network {}", profile.ssid);

        self.enter(WorkflowState::Applying);
        self.store.reset_all_priorities()?;
        self.store.add_wifi(profile.clone())?;
        let store = self.store.load()?;
        self.os_config
            .render_supplicant(&store.wifi, request.country_locale.clone())?;
        if let Some(static_ip) = &profile.static_ip {
            self.os_config
                .append_dhcp_stanza(&StanzaMarker::Ssid(profile.ssid.clone()), static_ip)?;
        }
        self.reconfigure_wifi().await;
        self.restart_network().await;

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.store_settle_secs).await;

        let ssid = profile.ssid.clone();
        let setup_id = self
            .commit_registration(Profile::Wifi(profile), SetupType::WifiStore, origin)
            .await;
        self.report(stored_message(ConnectionKind::Wifi, &ssid), setup_id)
            .await;
        Ok(WorkflowOutcome::Stored)
    }

    pub(super) async fn store_eth(
        &mut self, request: &NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let profile = match request.to_eth_profile(&Uuid::new_v4().to_string()) {
            Ok(profile) => profile,
            Err(e) => {
                error!("Refusing ethernet setup, error: {}", e);
                return Ok(WorkflowOutcome::Refused);
            }
        };
        let name = profile.static_ip.ip_address.clone();
        info!("Storing ethernet network {}", name);

        self.enter(WorkflowState::Applying);
        self.apply_eth_candidate(&profile, &StanzaMarker::Interface(self.eth_if()))
            .await?;

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.store_settle_secs).await;

        let setup_id = self
            .commit_registration(Profile::Eth(profile), SetupType::EthStore, origin)
            .await;
        self.report(stored_message(ConnectionKind::Eth, &name), setup_id).await;
        Ok(WorkflowOutcome::Stored)
    }

    /// Switches to a stored network, making it the preferred Wi-Fi network
    /// or the used ethernet setup.
    pub(super) async fn connect_stored(
        &mut self, kind: ConnectionKind, setup_id: NetworkSetupId,
    ) -> Result<WorkflowOutcome> {
        let Some(profile) = self.store.find_by_setup_id(kind, setup_id)? else {
            warn!("No stored {:?} connection with setup id {}", kind, setup_id);
            return Ok(WorkflowOutcome::Skipped);
        };

        self.enter(WorkflowState::Applying);
        let iface = match &profile {
            Profile::Wifi(wifi) => {
                info!("Switching to wifi network {}", wifi.ssid);
                self.wifi_if()
            }
            Profile::Eth(eth) => {
                info!("Switching to ethernet network {}", eth.static_ip.ip_address);
                self.eth_if()
            }
        };

        // the interface comes back up even when a step fails
        self.interface_down(&iface).await;
        let switched = self.switch_to(&profile, &iface);
        self.interface_up(&iface).await;
        if profile.kind() == ConnectionKind::Wifi {
            self.reconfigure_wifi().await;
        }
        self.restart_network().await;
        if let Err(e) = switched {
            error!("Failed to switch to stored network, error: {}", e);
            return Err(e);
        }

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.switch_settle_secs).await;
        Ok(WorkflowOutcome::Committed)
    }

    fn switch_to(&self, profile: &Profile, iface: &str) -> Result<()> {
        match profile {
            Profile::Wifi(wifi) => {
                self.store.reset_all_priorities()?;
                self.store.set_priority(&wifi.id, PREFERRED_PRIORITY)?;
                let store = self.store.load()?;
                self.os_config.render_supplicant(&store.wifi, None)
            }
            Profile::Eth(eth) => {
                eth.static_ip.validate()?;
                let marker = StanzaMarker::Interface(iface.to_string());
                self.os_config.remove_dhcp_stanza(&marker)?;
                self.store.set_used(&eth.id, true)?;
                self.os_config.append_dhcp_stanza(&marker, &eth.static_ip)
            }
        }
    }
}
