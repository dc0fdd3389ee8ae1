//! This module talks to the running wpa_supplicant over its control socket.
//!
//! A short lived `wpactrl` client is opened for each request, the supplicant
//! may be restarted between two requests.

use std::path::PathBuf;

use anyhow::anyhow;
use log::{info, warn};
use wpactrl::Client;

use crate::error::{NetError, Result};

#[cfg(test)]
use mockall::automock;

/// Trait defining operations for the wpa_supplicant control client.
#[cfg_attr(test, automock)]
pub trait WpaCtlClientOps: Send + Sync + 'static {
    /// Makes the supplicant reload its configuration file.
    fn reconfigure(&self) -> Result<()>;

    /// The SSID the supplicant is associated with, `None` when not
    /// connected.
    fn current_ssid(&self) -> Result<Option<String>>;

    /// Requests a new scan.
    fn scan(&self) -> Result<()>;

    /// The raw `SCAN_RESULTS` table.
    fn scan_results(&self) -> Result<String>;
}

/// Struct representing the WPA control client of one interface.
pub struct WpaCtl {
    control_dir: PathBuf,
    iw_name: String,
}

impl WpaCtl {
    pub fn new(control_dir: impl Into<PathBuf>, iw_name: &str) -> Self {
        Self { control_dir: control_dir.into(), iw_name: iw_name.to_string() }
    }

    fn handle_request(&self, request: &str) -> Result<String> {
        let soc_path = self.control_dir.join(&self.iw_name);
        let mut client = Client::builder()
            .ctrl_path(&soc_path)
            .open()
            .map_err(|e| NetError::command(format!("wpa_ctrl {}", request), e))?;

        let resp = client
            .request(request)
            .map_err(|e| NetError::command(format!("wpa_ctrl {}", request), e))?;
        if resp.trim() == "FAIL" {
            warn!("Supplicant rejected request {}", request);
            return Err(NetError::command(
                format!("wpa_ctrl {}", request),
                "FAIL",
            )
            .into());
        }
        Ok(resp)
    }
}

/// Parses the SSID out of a `STATUS` reply, only a completed association
/// counts.
pub fn ssid_from_status(status: &str) -> Option<String> {
    let mut completed = false;
    let mut ssid = None;
    for line in status.lines() {
        match line.split_once('=') {
            Some(("wpa_state", state)) => completed = state == "COMPLETED",
            Some(("ssid", value)) => ssid = Some(value.to_string()),
            _ => {}
        }
    }
    ssid.filter(|_| completed)
}

impl WpaCtlClientOps for WpaCtl {
    fn reconfigure(&self) -> Result<()> {
        info!("Reconfiguring supplicant of {}", self.iw_name);
        self.handle_request("RECONFIGURE").map(|_| ())
    }

    fn current_ssid(&self) -> Result<Option<String>> {
        let status = self.handle_request("STATUS")?;
        Ok(ssid_from_status(&status))
    }

    fn scan(&self) -> Result<()> {
        let resp = self.handle_request("SCAN")?;
        if resp.trim() == "FAIL-BUSY" {
            return Err(anyhow!("Supplicant is busy scanning"));
        }
        Ok(())
    }

    fn scan_results(&self) -> Result<String> {
        self.handle_request("SCAN_RESULTS")
    }
}
