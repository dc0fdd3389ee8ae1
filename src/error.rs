//! # Error handling utilities.
//! The crate-wide result is the generic anyhow error type. Failures that the
//! setup workflows need to tell apart are raised as `NetError` variants and
//! recovered with `downcast_ref`.

use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

/// Error taxonomy of the network setup subsystem.
#[derive(Error, Debug)]
pub enum NetError {
    /// An external command could not be spawned or exited unsuccessfully.
    #[error("command `{cmd}` failed: {reason}")]
    CommandExecution { cmd: String, reason: String },

    /// The reachability probe reported no connectivity.
    #[error("connectivity validation failed on interface {interface}")]
    ConnectivityValidation { interface: String },

    /// The connection store file is missing or could not be parsed.
    #[error("connection store error: {0}")]
    Persistence(String),

    /// The remote collaborator was unreachable or answered with an error.
    #[error("remote api error: {0}")]
    RemoteApi(String),

    #[error("setup queue is closed")]
    QueueClosed,
}

impl NetError {
    pub fn command(cmd: impl Into<String>, reason: impl ToString) -> Self {
        Self::CommandExecution { cmd: cmd.into(), reason: reason.to_string() }
    }

    pub fn unreachable(interface: &str) -> Self {
        Self::ConnectivityValidation { interface: interface.to_string() }
    }
}
