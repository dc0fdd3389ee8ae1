use log::info;

use super::{NetSetupController, WorkflowOutcome};
use crate::{
    error::Result,
    net_check::ReachabilityOps,
    net_ctl::NetIfCtl,
    net_data::ConnectionStoreOps,
    os_config::OsConfigOps,
    remote_api::{DeviceAction, NetworkSetupApi},
};

impl<S, O, I, V, A> NetSetupController<S, O, I, V, A>
where
    S: ConnectionStoreOps,
    O: OsConfigOps,
    I: NetIfCtl,
    V: ReachabilityOps,
    A: NetworkSetupApi,
{
    pub(super) async fn dispatch_action(
        &mut self, action: DeviceAction,
    ) -> Result<WorkflowOutcome> {
        info!("Handling device action {:?}", action);
        match action {
            DeviceAction::DeleteNetworks => {
                let ctx = self.context().await?;
                self.delete_all_with(&ctx).await
            }
            DeviceAction::DeleteNetwork { kind, network_setup_id } => {
                self.delete_by_setup_id(kind, network_setup_id).await
            }
            DeviceAction::ConnectToNetwork { kind, network_setup_id } => {
                self.connect_stored(kind, network_setup_id).await
            }
            DeviceAction::Other(name) => {
                info!("Device action {} is not a network action", name);
                Ok(WorkflowOutcome::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{controller, init_logger, quiet_net_if};
    use super::super::NetSetupOps;
    use super::*;
    use crate::{
        net_check::MockReachabilityOps,
        net_ctl::MockNetIfCtl,
        net_data::{ConnectionKind, Encryption, WifiProfile},
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

    #[tokio::test]
    async fn test_other_actions_are_skipped() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(
            &dir,
            MockNetIfCtl::new(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );

        let outcome = ctl
            .handle_device_action(DeviceAction::Other("restartApp".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, WorkflowOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_remote_delete_does_not_deregister() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        // no delete_network_setup expectation, a call would panic
        let mut ctl = controller(
            &dir,
            quiet_net_if(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );
        ctl.store.add_wifi(wifi("A", "Office", 7)).unwrap();
        ctl.store.add_wifi(wifi("B", "Home", 8)).unwrap();

        let outcome = ctl
            .handle_device_action(DeviceAction::DeleteNetwork {
                kind: ConnectionKind::Wifi,
                network_setup_id: 7,
            })
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Deleted);
        let store = ctl.store.load().unwrap();
        assert_eq!(store.wifi.len(), 1);
        assert_eq!(store.wifi[0].id, "B");
    }

    #[tokio::test]
    async fn test_connect_to_stored_network() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(
            &dir,
            quiet_net_if(),
            MockReachabilityOps::new(),
            MockNetworkSetupApi::new(),
        );
        ctl.store.add_wifi(wifi("A", "Office", 7)).unwrap();
        ctl.store.add_wifi(wifi("B", "Home", 8)).unwrap();

        let outcome = ctl
            .handle_device_action(DeviceAction::ConnectToNetwork {
                kind: ConnectionKind::Wifi,
                network_setup_id: 7,
            })
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Committed);
        let store = ctl.store.load().unwrap();
        assert_eq!(store.wifi[0].priority, 2);
        assert_eq!(store.wifi[1].priority, 1);
    }
}
