//! Launch and stop the automation sidecar as a child process.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running sidecar process. Killed on drop.
pub struct SidecarProcess {
    child: Child,
}

impl SidecarProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the process and wait for it to exit.
    pub async fn stop(&mut self) -> Result<()> {
        log::info!("session: stopping sidecar process");
        if let Err(e) = self.child.start_kill() {
            log::debug!("session: sidecar kill: {}", e);
        }
        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => log::info!("session: sidecar exited with {}", status),
            Ok(Err(e)) => log::warn!("session: error waiting for sidecar: {}", e),
            Err(_) => log::warn!("session: sidecar did not exit within {:?}", STOP_TIMEOUT),
        }
        Ok(())
    }
}

/// Spawn `command args...` with SESSION_DIR and CLIENT_ID in its environment.
/// Output lines are forwarded to the log under target `sidecar`.
/// Fails if the process cannot be spawned or exits immediately.
pub async fn start_sidecar(
    command: &str,
    args: &[String],
    session_dir: &Path,
    client_id: &str,
) -> Result<SidecarProcess> {
    log::info!("session: starting sidecar `{}`", command);
    let mut cmd = Command::new(command);
    cmd.args(args)
        .env("SESSION_DIR", session_dir)
        .env("CLIENT_ID", client_id)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning sidecar `{}`", command))?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!(target: "sidecar", "{}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::warn!(target: "sidecar", "{}", line);
            }
        });
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    match child.try_wait() {
        Ok(Some(status)) => bail!("sidecar exited immediately with {}", status),
        Ok(None) => {}
        Err(e) => bail!("checking sidecar status: {}", e),
    }
    Ok(SidecarProcess { child })
}
