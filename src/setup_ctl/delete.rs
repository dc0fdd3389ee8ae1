//! Delete workflows.
//!
//! Deletes never leave a category that had connections without any. The
//! files are rebuilt from the store after removal, with both interfaces
//! down.

use log::{error, info, warn};

use super::{
    plan_delete_all, DeletionPlan, NetContext, NetSetupController,
    RequestOrigin, WorkflowOutcome, WorkflowState,
};
use crate::{
    error::Result,
    net_check::ReachabilityOps,
    net_ctl::NetIfCtl,
    net_data::{ConnectionKind, ConnectionStoreOps, NetworkSetupId, Profile},
    os_config::{OsConfigOps, StanzaMarker},
    remote_api::NetworkSetupApi,
};

impl<S, O, I, V, A> NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    pub(super) async fn delete_connection(
        &mut self, kind: ConnectionKind, id: &str, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let store = self.store.load()?;
        let Some(profile) = store.find_by_id(kind, id) else {
            warn!("No {:?} connection {} to delete", kind, id);
            return Ok(WorkflowOutcome::Skipped);
        };
        if store.len_of(kind) == 1 {
            warn!("Refusing to delete {}, the only {:?} connection", id, kind);
            return Ok(WorkflowOutcome::Refused);
        }

        info!("Deleting {:?} connection {}", kind, id);
        self.enter(WorkflowState::Applying);
        self.all_interfaces_down().await;
        let removed = self.remove_profile(&profile);
        self.all_interfaces_up().await;

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.delete_one_settle_secs).await;
        removed?;

        if let (RequestOrigin::Local, Some(setup_id)) =
            (origin, profile.network_setup_id())
        {
            if let Err(e) = self.api.delete_network_setup(setup_id).await {
                error!("Failed to deregister setup {}, error: {}", setup_id, e);
            }
        }
        Ok(WorkflowOutcome::Deleted)
    }

    pub(super) async fn delete_by_setup_id(
        &mut self, kind: ConnectionKind, setup_id: NetworkSetupId,
    ) -> Result<WorkflowOutcome> {
        match self.store.find_by_setup_id(kind, setup_id)? {
            Some(profile) => {
                self.delete_connection(kind, profile.id(), RequestOrigin::Remote)
                    .await
            }
            None => {
                warn!("No {:?} connection with setup id {}", kind, setup_id);
                Ok(WorkflowOutcome::Skipped)
            }
        }
    }

    /// Deletes every connection not in use according to `ctx`.
    pub(super) async fn delete_all_with(
        &mut self, ctx: &NetContext,
    ) -> Result<WorkflowOutcome> {
        let plan = plan_delete_all(&ctx.store, ctx.current_ssid.as_deref());
        if plan.would_disconnect(&ctx.store) {
            warn!("Refusing to delete all connections, nothing would be left");
            return Ok(WorkflowOutcome::Refused);
        }
        if plan.is_empty() {
            info!("No unused connections to delete");
            return Ok(WorkflowOutcome::Skipped);
        }

        info!(
            "Deleting {} wifi and {} ethernet connection(s)",
            plan.wifi.len(),
            plan.eth.len()
        );
        if let Err(e) = self.api.after_delete_all_networks(&plan.ids_to_keep).await {
            error!("Failed to report the kept setups, error: {}", e);
        }

        self.enter(WorkflowState::Applying);
        self.all_interfaces_down().await;
        let removed = self.remove_planned(&plan);
        self.all_interfaces_up().await;

        self.enter(WorkflowState::Settling);
        self.settle(self.timings.delete_all_settle_secs).await;
        removed?;
        Ok(WorkflowOutcome::Deleted)
    }

    fn remove_profile(&self, profile: &Profile) -> Result<()> {
        self.store.remove(profile.kind(), profile.id())?;
        match profile {
            Profile::Wifi(wifi) => {
                let store = self.store.load()?;
                self.os_config.render_supplicant(&store.wifi, None)?;
                if wifi.static_ip.is_some() {
                    self.os_config
                        .remove_dhcp_stanza(&StanzaMarker::Ssid(wifi.ssid.clone()))?;
                }
            }
            // only the used profile has a stanza
            Profile::Eth(eth) if eth.is_used => {
                self.os_config
                    .remove_dhcp_stanza(&StanzaMarker::Interface(self.eth_if()))?;
            }
            Profile::Eth(_) => {}
        }
        Ok(())
    }

    fn remove_planned(&self, plan: &DeletionPlan) -> Result<()> {
        for wifi in &plan.wifi {
            self.store.remove(ConnectionKind::Wifi, &wifi.id)?;
            if wifi.static_ip.is_some() {
                self.os_config
                    .remove_dhcp_stanza(&StanzaMarker::Ssid(wifi.ssid.clone()))?;
            }
        }
        for eth in &plan.eth {
            self.store.remove(ConnectionKind::Eth, &eth.id)?;
        }

        let store = self.store.load()?;
        self.os_config.render_supplicant(&store.wifi, None)
    }

    async fn all_interfaces_down(&self) {
        self.interface_down(&self.wifi_if()).await;
        self.interface_down(&self.eth_if()).await;
    }

    async fn all_interfaces_up(&self) {
        self.interface_up(&self.wifi_if()).await;
        self.interface_up(&self.eth_if()).await;
        self.reconfigure_wifi().await;
        self.restart_network().await;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::super::tests::{controller, init_logger, quiet_net_if};
    use super::super::NetSetupOps;
    use super::*;
    use crate::{
        net_check::MockReachabilityOps,
        net_ctl::MockNetIfCtl,
        net_data::{Encryption, EthProfile, StaticIp, WifiProfile},
        remote_api::MockNetworkSetupApi,
    };

    fn wifi(id: &str, ssid: &str, setup_id: u64) -> WifiProfile {
        WifiProfile {
            id: id.to_string(),
            network_setup_id: Some(setup_id),
            ssid: ssid.to_string(),
            password: "secret123".to_string(),
            encryption: Encryption::WpaWpa2,
            encryption_options: None,
            priority: 1,
            static_ip: None,
        }
    }

    fn static_ip() -> StaticIp {
        StaticIp {
            ip_address: "10.0.0.5".to_string(),
            subnet_mask: "255.255.255.0".to_string(),
            default_gateway: "10.0.0.1".to_string(),
            ..Default::default()
        }
    }

    fn eth(id: &str, is_used: bool, setup_id: u64) -> EthProfile {
        EthProfile {
            id: id.to_string(),
            network_setup_id: Some(setup_id),
            is_used,
            static_ip: static_ip(),
        }
    }

    #[tokio::test]
    async fn test_deleting_the_only_wifi_is_a_noop() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );
        ctl.store.add_wifi(wifi("A", "X", 1)).unwrap();
        let before = ctl.store.load().unwrap();

        let outcome = ctl
            .delete_one(ConnectionKind::Wifi, "A", RequestOrigin::Local)
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Refused);
        assert_eq!(ctl.store.load().unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_one_rebuilds_files_and_deregisters() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = MockNetworkSetupApi::new();
        api.expect_delete_network_setup()
            .withf(|id| *id == 1)
            .times(1)
            .returning(|_| Ok(()));
        let mut ctl =
            controller(&dir, quiet_net_if(), MockReachabilityOps::new(), api);

        let mut office = wifi("A", "Office", 1);
        office.static_ip = Some(static_ip());
        ctl.store.add_wifi(office.clone()).unwrap();
        ctl.store.add_wifi(wifi("B", "Home", 2)).unwrap();
        let store = ctl.store.load().unwrap();
        ctl.os_config.render_supplicant(&store.wifi, None).unwrap();
        ctl.os_config
            .append_dhcp_stanza(&StanzaMarker::Ssid("Office".to_string()), &static_ip())
            .unwrap();

        let outcome = ctl
            .delete_one(ConnectionKind::Wifi, "A", RequestOrigin::Local)
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Deleted);
        let supplicant = fs::read_to_string(dir.path().join("wpa_supplicant.conf")).unwrap();
        assert!(!supplicant.contains("Office"));
        assert!(supplicant.contains("ssid=\"Home\""));
        assert_eq!(fs::read_to_string(dir.path().join("dhcpcd.conf")).unwrap(), "");
        assert_eq!(ctl.store.load().unwrap().wifi.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_keeps_live_connections() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut api = MockNetworkSetupApi::new();
        api.expect_after_delete_all_networks()
            .withf(|ids| ids.to_vec() == vec![2, 3])
            .times(1)
            .returning(|_| Ok(()));
        let mut ctl =
            controller(&dir, quiet_net_if(), MockReachabilityOps::new(), api);
        ctl.store.add_wifi(wifi("A", "X", 1)).unwrap();
        ctl.store.add_wifi(wifi("B", "Y", 2)).unwrap();
        ctl.store.add_eth(eth("C", true, 3)).unwrap();
        ctl.store.add_eth(eth("D", false, 4)).unwrap();

        let ctx = NetContext {
            current_ssid: Some("Y".to_string()),
            store: ctl.store.load().unwrap(),
            ..Default::default()
        };
        let outcome = ctl.delete_all_with(&ctx).await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::Deleted);
        let store = ctl.store.load().unwrap();
        assert_eq!(store.wifi.len(), 1);
        assert_eq!(store.wifi[0].id, "B");
        assert_eq!(store.eth.len(), 1);
        assert_eq!(store.eth[0].id, "C");
    }

    #[tokio::test]
    async fn test_delete_all_refused_when_nothing_is_live() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );
        ctl.store.add_wifi(wifi("A", "X", 1)).unwrap();
        let before = ctl.store.load().unwrap();

        let ctx = NetContext { store: before.clone(), ..Default::default() };
        let outcome = ctl.delete_all_with(&ctx).await.unwrap();

        assert_eq!(outcome, WorkflowOutcome::Refused);
        assert_eq!(ctl.store.load().unwrap(), before);
    }
}
