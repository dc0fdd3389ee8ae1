//! Command interface of the local kiosk UI.
//!
//! The UI writes one JSON command per line and reads one JSON reply per
//! line. Every command runs through the setup queue as a local request.

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::net_ctl::ScannedNetwork;
use crate::net_data::{ConnectionId, ConnectionKind};
use crate::remote_api::{NetworkSetupRecord, NetworkSetupRequest};
use crate::setup_ctl::{RequestOrigin, WorkflowOutcome};
use crate::setup_queue::SetupQueue;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum LocalCommand {
    /// Connect or store, in the same shape the server sends setups.
    ApplySetup { setup: NetworkSetupRecord },
    DeleteConnection { kind: ConnectionKind, id: ConnectionId },
    DeleteAll,
    ChangeCountry { code: String },
    ScanWifi,
}

impl LocalCommand {
    fn name(&self) -> &'static str {
        match self {
            LocalCommand::ApplySetup { .. } => "applySetup",
            LocalCommand::DeleteConnection { .. } => "deleteConnection",
            LocalCommand::DeleteAll => "deleteAll",
            LocalCommand::ChangeCountry { .. } => "changeCountry",
            LocalCommand::ScanWifi => "scanWifi",
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WorkflowOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<ScannedNetwork>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn run_command(queue: &SetupQueue, command: LocalCommand) -> Result<LocalReply> {
    info!("Running local {} command", command.name());
    let outcome = match command {
        LocalCommand::ApplySetup { setup } => {
            let request = NetworkSetupRequest::from_record(setup)?;
            queue.apply(request, RequestOrigin::Local).await?
        }
        LocalCommand::DeleteConnection { kind, id } => {
            queue.delete_one(kind, id, RequestOrigin::Local).await?
        }
        LocalCommand::DeleteAll => queue.delete_all().await?,
        LocalCommand::ChangeCountry { code } => queue.change_country(&code).await?,
        LocalCommand::ScanWifi => {
            let networks = queue.scan_wifi().await?;
            return Ok(LocalReply {
                ok: true,
                networks: Some(networks),
                ..Default::default()
            });
        }
    };

    Ok(LocalReply { ok: true, outcome: Some(outcome), ..Default::default() })
}

/// Runs one command line and returns the reply line. Failed commands are
/// answered with `ok: false` and the error text.
pub async fn handle_line(queue: &SetupQueue, line: &str) -> Result<String> {
    let result = match serde_json::from_str::<LocalCommand>(line) {
        Ok(command) => run_command(queue, command).await,
        Err(e) => Err(e.into()),
    };

    let reply = result.unwrap_or_else(|e| {
        error!("Failed to run local command, error: {}", e);
        LocalReply { ok: false, error: Some(e.to_string()), ..Default::default() }
    });
    Ok(serde_json::to_string(&reply)?)
}
