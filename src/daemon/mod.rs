//! Daemon module for background-work
//!
//! Hosts the lifecycle controller in a long-running process and exposes the
//! control surface over a Unix socket.

pub mod client;
pub mod ipc;
pub mod server;
pub mod service;
pub mod surface;

pub use surface::ControlSurface;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Settings;
use crate::daemon::client::DaemonClient;

/// How long `start_daemon` waits for the new daemon to answer a ping
const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether a daemon answers on the configured socket
pub async fn is_running(settings: &Settings) -> bool {
    match DaemonClient::connect(settings).await {
        Ok(mut client) => client.ping().await,
        Err(_) => false,
    }
}

/// Spawn `daemon start --foreground` detached and wait until it answers.
pub async fn start_daemon(settings: &Settings) -> Result<()> {
    if is_running(settings).await {
        anyhow::bail!("Daemon is already running");
    }
    clear_stale_files(settings)?;

    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .args(["daemon", "start", "--foreground"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    let deadline = Instant::now() + READY_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            anyhow::bail!(
                "Daemon failed to start (exit: {}). Run `background-work daemon start --foreground` for details.",
                status
            );
        }
        if is_running(settings).await {
            info!("Daemon ready (PID: {})", child.id());
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    anyhow::bail!(
        "Daemon did not answer within {:?}. Run `background-work daemon start --foreground` for details.",
        READY_TIMEOUT
    )
}

/// Wait until the daemon stops answering and its process is gone.
pub async fn wait_for_exit(settings: &Settings, timeout: Duration) -> bool {
    let pid_path = settings.pid_path();
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let pid_alive = read_pid(&pid_path).is_some_and(process_alive);
        if !pid_alive && !is_running(settings).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Remove pid and socket files left by a daemon that is gone.
///
/// Fails if the recorded process is still alive but not answering.
fn clear_stale_files(settings: &Settings) -> Result<()> {
    let pid_path = settings.pid_path();

    if let Some(pid) = read_pid(&pid_path) {
        if process_alive(pid) {
            anyhow::bail!(
                "Daemon process {} is alive but not answering on {:?}",
                pid,
                settings.socket_path()
            );
        }
        debug!("Removing stale PID file for {}", pid);
    }

    for path in [pid_path, settings.socket_path()] {
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale {:?}", path))?;
        }
    }

    Ok(())
}

fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Signal 0 checks existence without delivering anything.
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Run the daemon in the foreground
pub async fn run_foreground(settings: &Settings) -> Result<()> {
    service::run(settings).await
}
