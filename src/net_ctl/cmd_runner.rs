//! This module runs the external commands the network setup relies on.
//! It defines the `CmdRunnerOps` trait so the workflows can be tested
//! without touching real interfaces, and `CmdRunner` which spawns the
//! commands through `tokio::process`.

use async_trait::async_trait;
use log::{debug, error};
use tokio::process::Command;

use crate::error::{NetError, Result};

#[cfg(test)]
use mockall::automock;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    #[cfg(test)]
    pub fn ok(stdout: &str) -> Self {
        Self { success: true, stdout: stdout.to_string(), stderr: String::new() }
    }

    #[cfg(test)]
    pub fn failed(stderr: &str) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.to_string() }
    }
}

/// Trait defining the system command runner.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CmdRunnerOps: Send + Sync + 'static {
    /// Runs `program` with `args` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned, a non-zero
    /// exit is reported through `CmdOutput::success`.
    async fn run(&self, program: &str, args: Vec<String>) -> Result<CmdOutput>;
}

pub struct CmdRunner;

#[async_trait]
impl CmdRunnerOps for CmdRunner {
    async fn run(&self, program: &str, args: Vec<String>) -> Result<CmdOutput> {
        debug!("Running command: {} {}", program, args.join(" "));

        let output = Command::new(program).args(&args).output().await.map_err(
            |e| {
                error!("Failed to spawn {}, error: {}", program, e);
                NetError::command(program, e)
            },
        )?;

        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs a command and turns a non-zero exit into `NetError::CommandExecution`.
pub async fn run_checked<R: CmdRunnerOps + ?Sized>(
    runner: &R, program: &str, args: &[&str],
) -> Result<String> {
    let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    let cmd_line = format!("{} {}", program, args.join(" "));

    let output = runner.run(program, args).await?;
    if !output.success {
        error!("Command `{}` failed: {}", cmd_line, output.stderr.trim());
        return Err(NetError::command(cmd_line, output.stderr.trim()).into());
    }
    Ok(output.stdout)
}
