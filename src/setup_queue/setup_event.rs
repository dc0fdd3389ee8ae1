use tokio::sync::oneshot;

use crate::error::Result;
use crate::net_ctl::ScannedNetwork;
use crate::net_data::{ConnectionId, ConnectionKind};
use crate::remote_api::{DeviceAction, NetworkSetupRequest};
use crate::setup_ctl::{RequestOrigin, WorkflowOutcome};

pub type OutcomeResp = Option<oneshot::Sender<Result<WorkflowOutcome>>>;

#[derive(Debug)]
pub enum SetupEvent {
    //Connect or store
    ApplySetup {
        request: NetworkSetupRequest,
        origin: RequestOrigin,
        resp: OutcomeResp,
    },

    DeviceAction {
        action: DeviceAction,
        resp: OutcomeResp,
    },

    //Server reconciliation
    Sync {
        resp: OutcomeResp,
    },

    BootCheckup {
        resp: OutcomeResp,
    },

    //Deletes
    DeleteOne {
        kind: ConnectionKind,
        id: ConnectionId,
        origin: RequestOrigin,
        resp: OutcomeResp,
    },

    DeleteAll {
        resp: OutcomeResp,
    },

    ChangeCountry {
        code: String,
        resp: OutcomeResp,
    },

    ScanWifi {
        resp: Option<oneshot::Sender<Result<Vec<ScannedNetwork>>>>,
    },
}
