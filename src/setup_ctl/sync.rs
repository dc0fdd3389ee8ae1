//! Reconciliation with the server and the start-up check of the ethernet
//! setup.

use log::{error, info, warn};
use uuid::Uuid;

use super::{
    NetSetupController, WorkflowOutcome, WorkflowState, SETUP_APPLIED_MESSAGE,
    SETUP_FAILED_MESSAGE,
};
use crate::{
    error::{NetError, Result},
    net_check::ReachabilityOps,
    net_ctl::NetIfCtl,
    net_data::{ConnectionKind, ConnectionStore, ConnectionStoreOps},
    os_config::{OsConfigOps, StanzaMarker},
    remote_api::{NetworkSetupApi, NetworkSetupRequest, SyncOutcome},
};

/// Builds a store from the canonical set of the server. The first ethernet
/// setup is the used one. Setups that cannot be written to the config files
/// are left out.
pub fn store_from_requests(requests: &[NetworkSetupRequest]) -> ConnectionStore {
    let mut store = ConnectionStore::default();
    for request in requests {
        if let Err(e) = request.validate() {
            warn!("Skipping {} from the server, error: {}", request.display_name(), e);
            continue;
        }
        let id = Uuid::new_v4().to_string();
        match request.setup_type.kind() {
            ConnectionKind::Wifi => store.wifi.push(request.to_wifi_profile(&id)),
            ConnectionKind::Eth => match request.to_eth_profile(&id) {
                Ok(mut eth) => {
                    eth.is_used = store.eth.is_empty();
                    store.eth.push(eth);
                }
                Err(e) => warn!("Skipping ethernet setup, error: {}", e),
            },
        }
    }
    store
}

impl<S, O, I, V, A> NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    pub(super) async fn sync_with_server(&mut self) -> Result<WorkflowOutcome> {
        let local = self.store.load()?;
        info!(
            "Syncing {} wifi and {} ethernet connection(s) with the server",
            local.wifi.len(),
            local.eth.len()
        );

        let outcome = match self.api.sync_networks(&local).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to sync networks, error: {}", e);
                return Ok(WorkflowOutcome::Skipped);
            }
        };

        match outcome {
            SyncOutcome::StoreOnly(requests) => {
                info!("Storing {} network(s) from the server", requests.len());
                self.store.save(&store_from_requests(&requests))?;
                Ok(WorkflowOutcome::Stored)
            }
            SyncOutcome::FullReplace(requests) => {
                Ok(self.replace_all(store_from_requests(&requests)).await)
            }
        }
    }

    /// Replaces the store and every config file with `canonical`.
    async fn replace_all(&mut self, canonical: ConnectionStore) -> WorkflowOutcome {
        info!(
            "Applying {} wifi and {} ethernet connection(s) from the server",
            canonical.wifi.len(),
            canonical.eth.len()
        );

        self.enter(WorkflowState::BackingUp);
        if let Err(e) = self.os_config.backup() {
            error!("Failed to back up network configuration, error: {}", e);
            return WorkflowOutcome::Skipped;
        }

        self.enter(WorkflowState::Applying);
        if let Err(e) = self.apply_canonical(&canonical).await {
            error!("Failed to apply the network setup, error: {}", e);
            self.enter(WorkflowState::RollingBack);
            self.restore_backups().await;
            self.report(SETUP_FAILED_MESSAGE.to_string(), None).await;
            return WorkflowOutcome::RolledBack;
        }

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.connect_settle_secs).await;

        self.enter(WorkflowState::Validating);
        let reachable = if canonical.eth.is_empty() {
            self.validate_wifi(&canonical).await
        } else {
            self.validate_eth(&canonical).await
        };

        if !reachable {
            self.report(SETUP_FAILED_MESSAGE.to_string(), None).await;
            return WorkflowOutcome::RolledBack;
        }
        self.enter(WorkflowState::Committed);
        self.report(SETUP_APPLIED_MESSAGE.to_string(), None).await;
        WorkflowOutcome::Committed
    }

    async fn apply_canonical(&self, canonical: &ConnectionStore) -> Result<()> {
        self.store.save(canonical)?;
        self.os_config.render_supplicant(&canonical.wifi, None)?;
        if let Some(eth) = canonical.eth.first() {
            let marker = StanzaMarker::Interface(self.eth_if());
            self.os_config.remove_dhcp_stanza(&marker)?;
            self.os_config.append_dhcp_stanza(&marker, &eth.static_ip)?;
        }
        self.net_if.reconfigure_wifi().await?;
        self.restart_network().await;
        Ok(())
    }

    /// Wi-Fi only setups go back to the backups when unreachable.
    async fn validate_wifi(&mut self, canonical: &ConnectionStore) -> bool {
        if canonical.wifi.is_empty() {
            return true;
        }

        let report = self.validator.check_reachability(&self.wifi_if()).await;
        if report.is_reachable() {
            return true;
        }

        warn!("{}: {:?}", NetError::unreachable(&self.wifi_if()), report);
        self.enter(WorkflowState::RollingBack);
        self.restore_backups().await;
        self.settle(self.timings.rollback_settle_secs).await;
        false
    }

    /// Only the ethernet leg is undone when ethernet is unreachable.
    async fn validate_eth(&mut self, canonical: &ConnectionStore) -> bool {
        let eth_if = self.eth_if();
        if self.validator.check_primary(&eth_if).await.is_success() {
            return true;
        }

        warn!("{}, dropping the synced ethernet setup", NetError::unreachable(&eth_if));
        self.enter(WorkflowState::RollingBack);
        self.drop_eth_stanza(!canonical.wifi.is_empty()).await;
        false
    }

    /// Removes the ethernet stanza and lets the network fall back to Wi-Fi.
    async fn drop_eth_stanza(&self, has_wifi: bool) {
        let marker = StanzaMarker::Interface(self.eth_if());
        if let Err(e) = self.os_config.remove_dhcp_stanza(&marker) {
            error!("Failed to remove ethernet stanza, error: {}", e);
        }
        if has_wifi {
            self.reconfigure_wifi().await;
        }
        self.restart_network().await;
        self.settle(self.timings.rollback_settle_secs).await;
    }

    pub(super) async fn check_up(&mut self) -> Result<WorkflowOutcome> {
        self.store.ensure_exists()?;
        let store = self.store.load()?;
        let Some(eth) = store.used_eth().or(store.eth.first()).cloned() else {
            info!("No ethernet connection stored, skipping the check-up");
            return Ok(WorkflowOutcome::Skipped);
        };

        if let Err(e) = eth.static_ip.validate() {
            error!("Stored ethernet connection cannot be applied, error: {}", e);
            return Ok(WorkflowOutcome::Refused);
        }

        info!("Checking ethernet connection {}", eth.static_ip.ip_address);
        let eth_if = self.eth_if();
        let marker = StanzaMarker::Interface(eth_if.clone());

        self.enter(WorkflowState::Applying);
        self.os_config.remove_dhcp_stanza(&marker)?;
        self.os_config.append_dhcp_stanza(&marker, &eth.static_ip)?;
        self.restart_network().await;

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.eth_settle_secs).await;

        self.enter(WorkflowState::Validating);
        if self.validator.check_primary(&eth_if).await.is_success() {
            return Ok(WorkflowOutcome::Committed);
        }

        warn!("{}, falling back", NetError::unreachable(&eth_if));
        self.enter(WorkflowState::RollingBack);
        self.drop_eth_stanza(!store.wifi.is_empty()).await;
        Ok(WorkflowOutcome::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::super::tests::{
        controller, init_logger, logging_api, quiet_net_if, validator,
    };
    use super::super::NetSetupOps;
    use super::*;
    use crate::{
        net_check::{MockReachabilityOps, PingStatus},
        net_ctl::MockNetIfCtl,
        net_data::{Encryption, EthProfile, StaticIp, PREFERRED_PRIORITY},
        remote_api::{MockNetworkSetupApi, SetupType},
    };

    fn wifi_request(ssid: &str) -> NetworkSetupRequest {
        NetworkSetupRequest {
            setup_type: SetupType::WifiStore,
            network_setup_id: Some(5),
            ssid: ssid.to_string(),
            password: "secret123".to_string(),
            encryption: Encryption::WpaWpa2,
            encryption_options: None,
            priority: PREFERRED_PRIORITY,
            country_locale: None,
            static_ip: None,
        }
    }

    fn eth_request(ip: &str) -> NetworkSetupRequest {
        NetworkSetupRequest {
            setup_type: SetupType::EthStore,
            static_ip: Some(static_ip(ip)),
            ..wifi_request("")
        }
    }

    fn static_ip(ip: &str) -> StaticIp {
        StaticIp {
            ip_address: ip.to_string(),
            subnet_mask: "255.255.255.0".to_string(),
            default_gateway: "10.0.0.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_eth_is_used() {
        let store = store_from_requests(&[
            eth_request("10.0.0.5"),
            wifi_request("Home"),
            eth_request("10.0.0.6"),
        ]);

        assert_eq!(store.wifi.len(), 1);
        assert_eq!(store.eth.len(), 2);
        assert!(store.eth[0].is_used);
        assert!(!store.eth[1].is_used);

        let mut broken = eth_request("10.0.0.7");
        broken.static_ip = Some(StaticIp {
            subnet_mask: "255.0.255.0".to_string(),
            ..static_ip("10.0.0.7")
        });
        let store = store_from_requests(&[
            broken,
            wifi_request("Bad\"ssid"),
            eth_request("10.0.0.8"),
        ]);
        assert!(store.wifi.is_empty());
        assert_eq!(store.eth.len(), 1);
        assert!(store.eth[0].is_used);
        assert_eq!(store.eth[0].static_ip.ip_address, "10.0.0.8");
        assert_eq!(store.wifi[0].network_setup_id, Some(5));
    }

    #[tokio::test]
    async fn test_store_only_sync_leaves_files_alone() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = MockNetworkSetupApi::new();
        api.expect_sync_networks()
            .times(1)
            .returning(|_| Ok(SyncOutcome::StoreOnly(vec![wifi_request("Home")])));
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            api,
        );

        let outcome = ctl.sync().await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::Stored);
        assert_eq!(ctl.store.load().unwrap().wifi[0].ssid, "Home");
        assert!(!dir.path().join("wpa_supplicant.conf").exists());
    }

    #[tokio::test]
    async fn test_full_replace_sync_applies_everything() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = logging_api();
        api.expect_sync_networks().times(1).returning(|_| {
            Ok(SyncOutcome::FullReplace(vec![
                wifi_request("Home"),
                eth_request("10.0.0.5"),
            ]))
        });
        let mut ctl = controller(
            &dir,
            quiet_net_if(),
            validator(PingStatus::PingSuccess),
            api,
        );

        let outcome = ctl.sync().await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::Committed);
        let supplicant = fs::read_to_string(dir.path().join("wpa_supplicant.conf")).unwrap();
        assert!(supplicant.contains("ssid=\"Home\""));
        let dhcpcd = fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap();
        assert!(dhcpcd.contains("interface eth0\nstatic ip_address=10.0.0.5/24"));
    }

    #[tokio::test]
    async fn test_unreachable_synced_eth_drops_its_stanza() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = logging_api();
        api.expect_sync_networks().times(1).returning(|_| {
            Ok(SyncOutcome::FullReplace(vec![
                wifi_request("Home"),
                eth_request("10.0.0.5"),
            ]))
        });
        let mut ctl = controller(
            &dir,
            quiet_net_if(),
            validator(PingStatus::PingFail),
            api,
        );

        let outcome = ctl.sync().await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::RolledBack);
        let dhcpcd = fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap();
        assert!(!dhcpcd.contains("interface eth0"));
        assert_eq!(ctl.store.load().unwrap().eth.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_synced_wifi_restores_backups() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = logging_api();
        api.expect_sync_networks()
            .times(1)
            .returning(|_| Ok(SyncOutcome::FullReplace(vec![wifi_request("Home")])));
        let mut ctl = controller(
            &dir,
            quiet_net_if(),
            validator(PingStatus::PingFail),
            api,
        );
        let before = ctl.store.load().unwrap();

        let outcome = ctl.sync().await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::RolledBack);
        assert_eq!(ctl.store.load().unwrap(), before);
        assert!(!dir.path().join("wpa_supplicant.conf").exists());
    }

    #[tokio::test]
    async fn test_failed_sync_request_is_skipped() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = MockNetworkSetupApi::new();
        api.expect_sync_networks()
            .returning(|_| Err(anyhow::anyhow!("unreachable")));
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            api,
        );

        assert_eq!(ctl.sync().await.unwrap(), WorkflowOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_check_up_without_eth_is_skipped() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );

        assert_eq!(ctl.boot_checkup().await.unwrap(), WorkflowOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_check_up_falls_back_to_wifi() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut net_if = MockNetIfCtl::new();
        net_if.expect_restart_network_service().times(2).returning(|| Ok(()));
        net_if.expect_reconfigure_wifi().times(1).returning(|| Ok(()));
        let mut ctl = controller(
            &dir,
            net_if,
            validator(PingStatus::PingFail),
            MockNetworkSetupApi::new(),
        );
        ctl.store
            .add_eth(EthProfile {
                id: "a".to_string(),
                network_setup_id: None,
                is_used: true,
                static_ip: static_ip("10.0.0.5"),
            })
            .unwrap();
        ctl.store
            .add_wifi(wifi_request("Home").to_wifi_profile("w"))
            .unwrap();

        assert_eq!(ctl.boot_checkup().await.unwrap(), WorkflowOutcome::RolledBack);
        let dhcpcd = fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap();
        assert!(!dhcpcd.contains("interface eth0"));
    }

    #[tokio::test]
    async fn test_check_up_leaves_unrenderable_eth_alone() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut net_if = MockNetIfCtl::new();
        net_if.expect_restart_network_service().never();
        let mut ctl = controller(
            &dir,
            net_if,
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );
        let stored = static_ip("10.0.0.5");
        ctl.store
            .add_eth(EthProfile {
                id: "a".to_string(),
                network_setup_id: None,
                is_used: true,
                static_ip: StaticIp {
                    subnet_mask: "255.255.255".to_string(),
                    ..stored.clone()
                },
            })
            .unwrap();
        fs::write(dir.path().join("dhcpcd.conf"), "hostname\n").unwrap();
        ctl.os_config
            .append_dhcp_stanza(&StanzaMarker::Interface("eth0".to_string()), &stored)
            .unwrap();
        let before = fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap();

        assert_eq!(ctl.boot_checkup().await.unwrap(), WorkflowOutcome::Refused);
        assert_eq!(
            fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap(),
            before
        );
    }
}
