//! Single-worker queue in front of the setup workflows.
//!
//! Workflows from the local UI, the remote poller and the start-up sequence
//! all go through one task, so two workflows never touch the config files
//! at the same time. Events are handled in the order they were sent.

mod setup_event;

pub use setup_event::SetupEvent;

use log::info;
use tokio::sync::mpsc::Sender;
use tokio::sync::{mpsc, oneshot};

use crate::error::{NetError, Result};
use crate::net_ctl::ScannedNetwork;
use crate::net_data::{ConnectionId, ConnectionKind};
use crate::remote_api::{DeviceAction, NetworkSetupRequest};
use crate::setup_ctl::{NetSetupOps, RequestOrigin, WorkflowOutcome};

pub struct SetupQueue {
    setup_tx: Sender<SetupEvent>,
    _drop_tx: oneshot::Sender<()>,
}

fn respond<T>(resp: Option<oneshot::Sender<T>>, value: T) {
    if let Some(tx) = resp {
        let _ = tx.send(value);
    }
}

impl SetupQueue {
    pub fn new(mut setup_ops: impl NetSetupOps) -> Self {
        let (setup_tx, mut setup_rx) = mpsc::channel(64);

        let (drop_tx, mut drop_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = setup_rx.recv() => {
                        Self::process_setup_event(&mut setup_ops, event).await;
                    }
                    _ = &mut drop_rx => {
                        info!("Setup queue task is stopping");
                        break;
                    }
                }
            }
        });

        Self { setup_tx, _drop_tx: drop_tx }
    }

    async fn process_setup_event(setup_ops: &mut impl NetSetupOps, event: SetupEvent) {
        match event {
            SetupEvent::ApplySetup { request, origin, resp } => {
                respond(resp, setup_ops.apply_network_setup(request, origin).await);
            }
            SetupEvent::DeviceAction { action, resp } => {
                respond(resp, setup_ops.handle_device_action(action).await);
            }
            SetupEvent::Sync { resp } => {
                respond(resp, setup_ops.sync().await);
            }
            SetupEvent::BootCheckup { resp } => {
                respond(resp, setup_ops.boot_checkup().await);
            }
            SetupEvent::DeleteOne { kind, id, origin, resp } => {
                respond(resp, setup_ops.delete_one(kind, &id, origin).await);
            }
            SetupEvent::DeleteAll { resp } => {
                respond(resp, setup_ops.delete_all().await);
            }
            SetupEvent::ChangeCountry { code, resp } => {
                respond(resp, setup_ops.change_country(&code).await);
            }
            SetupEvent::ScanWifi { resp } => {
                respond(resp, setup_ops.scan_wifi().await);
            }
        }
    }

    #[cfg(test)]
    pub fn get_setup_tx(&self) -> Sender<SetupEvent> {
        self.setup_tx.clone()
    }

    /// Sends `event` and waits for the workflow result on `rx`.
    async fn request<T>(
        &self, event: SetupEvent, rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.setup_tx.send(event).await.map_err(|_| NetError::QueueClosed)?;
        rx.await.map_err(|_| NetError::QueueClosed)?
    }

    pub async fn apply(
        &self, request: NetworkSetupRequest, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        let event = SetupEvent::ApplySetup { request, origin, resp: Some(tx) };
        self.request(event, rx).await
    }

    pub async fn device_action(&self, action: DeviceAction) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(SetupEvent::DeviceAction { action, resp: Some(tx) }, rx)
            .await
    }

    pub async fn sync(&self) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(SetupEvent::Sync { resp: Some(tx) }, rx).await
    }

    pub async fn boot_checkup(&self) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(SetupEvent::BootCheckup { resp: Some(tx) }, rx).await
    }

    pub async fn delete_one(
        &self, kind: ConnectionKind, id: ConnectionId, origin: RequestOrigin,
    ) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        let event = SetupEvent::DeleteOne { kind, id, origin, resp: Some(tx) };
        self.request(event, rx).await
    }

    pub async fn delete_all(&self) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(SetupEvent::DeleteAll { resp: Some(tx) }, rx).await
    }

    pub async fn change_country(&self, code: &str) -> Result<WorkflowOutcome> {
        let (tx, rx) = oneshot::channel();
        let event = SetupEvent::ChangeCountry { code: code.to_string(), resp: Some(tx) };
        self.request(event, rx).await
    }

    pub async fn scan_wifi(&self) -> Result<Vec<ScannedNetwork>> {
        let (tx, rx) = oneshot::channel();
        self.request(SetupEvent::ScanWifi { resp: Some(tx) }, rx).await
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;

    use super::*;
    use crate::setup_ctl::MockNetSetupOps;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn test_sync_through_queue() {
        init_logger();
        let mut ops = MockNetSetupOps::new();
        ops.expect_sync()
            .times(1)
            .returning(|| Ok(WorkflowOutcome::Committed));

        let queue = SetupQueue::new(ops);

        assert_eq!(queue.sync().await.unwrap(), WorkflowOutcome::Committed);
    }

    #[tokio::test]
    async fn test_events_run_in_order() {
        init_logger();
        let mut seq = Sequence::new();
        let mut ops = MockNetSetupOps::new();
        ops.expect_boot_checkup()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(WorkflowOutcome::Skipped));
        ops.expect_delete_one()
            .withf(|kind, id, origin| {
                *kind == ConnectionKind::Wifi
                    && id.to_string() == "A"
                    && *origin == RequestOrigin::Local
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(WorkflowOutcome::Deleted));
        ops.expect_sync()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(WorkflowOutcome::Stored));

        let queue = SetupQueue::new(ops);
        let setup_tx = queue.get_setup_tx();

        let (boot_tx, boot_rx) = oneshot::channel();
        let (delete_tx, delete_rx) = oneshot::channel();
        let (sync_tx, sync_rx) = oneshot::channel();
        setup_tx
            .send(SetupEvent::BootCheckup { resp: Some(boot_tx) })
            .await
            .unwrap();
        setup_tx
            .send(SetupEvent::DeleteOne {
                kind: ConnectionKind::Wifi,
                id: "A".to_string(),
                origin: RequestOrigin::Local,
                resp: Some(delete_tx),
            })
            .await
            .unwrap();
        setup_tx.send(SetupEvent::Sync { resp: Some(sync_tx) }).await.unwrap();

        assert_eq!(sync_rx.await.unwrap().unwrap(), WorkflowOutcome::Stored);
        assert_eq!(delete_rx.await.unwrap().unwrap(), WorkflowOutcome::Deleted);
        assert_eq!(boot_rx.await.unwrap().unwrap(), WorkflowOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_workflow_error_reaches_caller() {
        init_logger();
        let mut ops = MockNetSetupOps::new();
        ops.expect_change_country()
            .returning(|_| Err(anyhow::anyhow!("read-only file system")));

        let queue = SetupQueue::new(ops);

        let err = queue.change_country("DE").await.unwrap_err();
        assert_eq!(err.to_string(), "read-only file system");
    }

    #[tokio::test]
    async fn test_event_without_responder() {
        init_logger();
        let mut ops = MockNetSetupOps::new();
        ops.expect_delete_all()
            .times(1)
            .returning(|| Ok(WorkflowOutcome::Refused));
        ops.expect_scan_wifi().times(1).returning(|| Ok(Vec::new()));

        let queue = SetupQueue::new(ops);
        queue
            .get_setup_tx()
            .send(SetupEvent::DeleteAll { resp: None })
            .await
            .unwrap();

        assert!(queue.scan_wifi().await.unwrap().is_empty());
    }
}
