//! Workflow outcomes and states, and the delete-all selection.

use std::fmt;

use serde::Serialize;

use crate::net_data::{ConnectionStore, EthProfile, NetworkSetupId, WifiProfile};

/// How a workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowOutcome {
    /// The change was validated and kept.
    Committed,
    /// The change failed and the previous configuration is back.
    RolledBack,
    /// The profile was stored and applied without validation.
    Stored,
    Deleted,
    /// The request would leave the device without connections, or it
    /// cannot be written to the config files.
    Refused,
    /// Nothing to do.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    BackingUp,
    Applying,
    Settling,
    Validating,
    Committed,
    RollingBack,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where a request came from. Local requests are registered with the
/// server, remote ones already are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Local,
    Remote,
}

/// The profiles a delete-all removes and the setup ids that survive it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub wifi: Vec<WifiProfile>,
    pub eth: Vec<EthProfile>,
    pub ids_to_keep: Vec<NetworkSetupId>,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.wifi.is_empty() && self.eth.is_empty()
    }

    /// True if the plan empties a category that has entries.
    pub fn would_disconnect(&self, store: &ConnectionStore) -> bool {
        (!store.wifi.is_empty() && self.wifi.len() == store.wifi.len())
            || (!store.eth.is_empty() && self.eth.len() == store.eth.len())
    }
}

/// Selects what a delete-all removes.
///
/// Wi-Fi profiles for the live SSID and used ethernet profiles are kept,
/// with no live SSID every Wi-Fi profile is selected.
pub fn plan_delete_all(
    store: &ConnectionStore, live_ssid: Option<&str>,
) -> DeletionPlan {
    let (keep_wifi, wifi): (Vec<_>, Vec<_>) = store
        .wifi
        .iter()
        .cloned()
        .partition(|conn| live_ssid == Some(conn.ssid.as_str()));
    let (keep_eth, eth): (Vec<_>, Vec<_>) =
        store.eth.iter().cloned().partition(|conn| conn.is_used);

    let ids_to_keep = keep_wifi
        .iter()
        .filter_map(|conn| conn.network_setup_id)
        .chain(keep_eth.iter().filter_map(|conn| conn.network_setup_id))
        .collect();

    DeletionPlan { wifi, eth, ids_to_keep }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_data::{Encryption, StaticIp};

    fn wifi(id: &str, ssid: &str, setup_id: Option<u64>) -> WifiProfile {
        WifiProfile {
            id: id.to_string(),
            network_setup_id: setup_id,
            ssid: ssid.to_string(),
            password: String::new(),
            encryption: Encryption::Open,
            encryption_options: None,
            priority: 1,
            static_ip: None,
        }
    }

    fn eth(id: &str, is_used: bool, setup_id: Option<u64>) -> EthProfile {
        EthProfile {
            id: id.to_string(),
            network_setup_id: setup_id,
            is_used,
            static_ip: StaticIp::default(),
        }
    }

    #[test]
    fn test_keeps_live_wifi_and_used_eth() {
        let store = ConnectionStore {
            wifi: vec![wifi("A", "X", Some(1)), wifi("B", "Y", Some(2))],
            eth: vec![eth("C", true, Some(3))],
        };

        let plan = plan_delete_all(&store, Some("Y"));

        assert_eq!(plan.wifi.len(), 1);
        assert_eq!(plan.wifi[0].id, "A");
        assert!(plan.eth.is_empty());
        assert_eq!(plan.ids_to_keep, vec![2, 3]);
        assert!(!plan.would_disconnect(&store));
    }

    #[test]
    fn test_unassigned_ids_are_not_kept() {
        let store = ConnectionStore {
            wifi: vec![wifi("A", "X", None), wifi("B", "Y", None)],
            eth: vec![eth("C", true, None), eth("D", false, Some(4))],
        };

        let plan = plan_delete_all(&store, Some("Y"));

        assert!(plan.ids_to_keep.is_empty());
        assert_eq!(plan.eth.len(), 1);
        assert_eq!(plan.eth[0].id, "D");
    }

    #[test]
    fn test_without_live_ssid_all_wifi_would_go() {
        let store = ConnectionStore {
            wifi: vec![wifi("A", "X", None)],
            eth: vec![],
        };

        let plan = plan_delete_all(&store, None);

        assert_eq!(plan.wifi.len(), 1);
        assert!(plan.would_disconnect(&store));
    }

    #[test]
    fn test_single_live_wifi_is_an_empty_plan() {
        let store = ConnectionStore {
            wifi: vec![wifi("A", "X", None)],
            eth: vec![],
        };

        let plan = plan_delete_all(&store, Some("X"));
        assert!(plan.is_empty());
        assert!(!plan.would_disconnect(&store));
    }
}
