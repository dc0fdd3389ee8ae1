//! This module validates connectivity after a network change.
//!
//! `PingValidator` pings two fixed targets over a given interface; the
//! result is the commit gate of the connect workflows. `await_convergence`
//! waits for the OS networking stack to settle before judging it.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::{config::ProbeConfig, net_ctl::CmdRunnerOps};

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PingStatus {
    PingSuccess,
    PingFail,
}

impl PingStatus {
    pub fn is_success(&self) -> bool {
        *self == PingStatus::PingSuccess
    }
}

/// Outcome of probing both targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PingReport {
    pub primary: PingStatus,
    pub secondary: PingStatus,
}

impl PingReport {
    /// A change is kept only if both targets answered.
    pub fn is_reachable(&self) -> bool {
        self.primary.is_success() && self.secondary.is_success()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReachabilityOps: Send + Sync + 'static {
    /// Pings both targets over `iface`.
    async fn check_reachability(&self, iface: &str) -> PingReport;

    /// Pings only the primary target over `iface`.
    async fn check_primary(&self, iface: &str) -> PingStatus;
}

/// Classifies the summary printed by `ping -q`.
pub fn is_ping_successful(output: &str, count: u32) -> bool {
    output.contains(&format!("{} packets transmitted", count))
        && !output.contains("100% packet loss")
}

pub struct PingValidator<R> {
    runner: R,
    probe: ProbeConfig,
}

impl<R: CmdRunnerOps> PingValidator<R> {
    pub fn new(runner: R, probe: ProbeConfig) -> Self {
        Self { runner, probe }
    }

    async fn ping(&self, target: &str, iface: &str) -> PingStatus {
        let args = vec![
            target.to_string(),
            "-I".to_string(),
            iface.to_string(),
            "-c".to_string(),
            self.probe.ping_count.to_string(),
            "-q".to_string(),
        ];

        match self.runner.run("ping", args).await {
            Ok(output)
                if is_ping_successful(&output.stdout, self.probe.ping_count) =>
            {
                debug!("Ping {} over {} succeeded", target, iface);
                PingStatus::PingSuccess
            }
            Ok(_) => {
                warn!("Ping {} over {} failed", target, iface);
                PingStatus::PingFail
            }
            Err(e) => {
                error!("Failed to ping {}, error: {}", target, e);
                PingStatus::PingFail
            }
        }
    }
}

#[async_trait]
impl<R: CmdRunnerOps> ReachabilityOps for PingValidator<R> {
    async fn check_reachability(&self, iface: &str) -> PingReport {
        let primary = self.ping(&self.probe.primary_target, iface).await;
        let secondary = self.ping(&self.probe.secondary_target, iface).await;
        info!(
            "Reachability over {}: primary {:?}, secondary {:?}",
            iface, primary, secondary
        );
        PingReport { primary, secondary }
    }

    async fn check_primary(&self, iface: &str) -> PingStatus {
        self.ping(&self.probe.primary_target, iface).await
    }
}

/// Bounds the wait for the networking stack to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    pub max_wait: Duration,
    /// Zero waits the whole `max_wait` and probes once.
    pub poll_interval: Duration,
}

impl ConvergencePolicy {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self { max_wait, poll_interval }
    }
}

/// Waits for `iface` to become reachable, probing every poll interval, and
/// returns the last report once reachable or once `max_wait` has passed.
pub async fn await_convergence<V: ReachabilityOps + ?Sized>(
    validator: &V, iface: &str, policy: ConvergencePolicy,
) -> PingReport {
    if policy.poll_interval.is_zero() {
        sleep(policy.max_wait).await;
        return validator.check_reachability(iface).await;
    }

    let deadline = Instant::now() + policy.max_wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(policy.poll_interval.min(remaining)).await;

        let report = validator.check_reachability(iface).await;
        if report.is_reachable() || Instant::now() >= deadline {
            return report;
        }
        debug!("{} not reachable yet, polling again", iface);
    }
}
