//! Engines that turn an entrypoint into a running worker

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::worker::{Engine, Envelope, WorkerChannel, WorkerMessage};

/// Prefix for workers that run inside the daemon
pub const BUILTIN_PREFIX: &str = "builtin:";

/// How long a child gets to exit on EOF before SIGTERM
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Resolves `builtin:` entrypoints in-process and everything else as an executable
#[derive(Debug, Default, Clone)]
pub struct EngineRegistry {
    builtin: BuiltinEngine,
    process: ProcessEngine,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Engine for EngineRegistry {
    async fn launch(&self, entrypoint: &str) -> Result<WorkerChannel> {
        if entrypoint.starts_with(BUILTIN_PREFIX) {
            self.builtin.launch(entrypoint).await
        } else {
            self.process.launch(entrypoint).await
        }
    }
}

/// In-process workers living on a tokio task
#[derive(Debug, Default, Clone)]
pub struct BuiltinEngine;

#[async_trait]
impl Engine for BuiltinEngine {
    async fn launch(&self, entrypoint: &str) -> Result<WorkerChannel> {
        let name = entrypoint
            .strip_prefix(BUILTIN_PREFIX)
            .unwrap_or(entrypoint);

        match name {
            "log" => Ok(WorkerChannel::spawn(log_worker)),
            other => anyhow::bail!("Unknown builtin entrypoint: {}", other),
        }
    }
}

/// Logs every message it receives. Useful as a default and for smoke tests.
async fn log_worker(mut rx: tokio::sync::mpsc::Receiver<Envelope>) {
    let mut destination = None;

    while let Some(Envelope { message, ack }) = rx.recv().await {
        let shutdown = matches!(message, WorkerMessage::Shutdown);
        match message {
            WorkerMessage::Destination(path) => {
                info!("Worker writing to {}", path);
                destination = Some(path);
            }
            WorkerMessage::Phase(phase) => {
                info!(
                    "Worker phase: {} ({})",
                    phase,
                    destination.as_deref().unwrap_or("no destination")
                );
            }
            WorkerMessage::Shutdown => info!("Worker shutting down"),
        }

        let _ = ack.send(Ok(()));
        if shutdown {
            break;
        }
    }
}

/// Runs the entrypoint as a child process and feeds it JSON lines on stdin
#[derive(Debug, Default, Clone)]
pub struct ProcessEngine;

#[async_trait]
impl Engine for ProcessEngine {
    async fn launch(&self, entrypoint: &str) -> Result<WorkerChannel> {
        let mut child = Command::new(entrypoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker: {}", entrypoint))?;

        let stdin = child
            .stdin
            .take()
            .context("Worker process has no stdin")?;

        info!("Spawned worker process {:?} ({})", child.id(), entrypoint);

        Ok(WorkerChannel::spawn(move |rx| process_worker(child, stdin, rx)))
    }
}

async fn process_worker(
    mut child: Child,
    mut stdin: ChildStdin,
    mut rx: tokio::sync::mpsc::Receiver<Envelope>,
) {
    while let Some(Envelope { message, ack }) = rx.recv().await {
        let shutdown = matches!(message, WorkerMessage::Shutdown);
        let result = write_line(&mut stdin, &message).await;

        if shutdown {
            drop(stdin);
            let exit = match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(exit) => exit,
                Err(_) => {
                    debug!("Worker ignored EOF, sending SIGTERM");
                    terminate(&mut child);
                    child.wait().await
                }
            };
            let result = match (result, exit) {
                (Err(e), _) => Err(e),
                (Ok(()), Ok(status)) if status.success() => Ok(()),
                (Ok(()), Ok(status)) => Err(format!("worker exited with {}", status)),
                (Ok(()), Err(e)) => Err(e.to_string()),
            };
            let _ = ack.send(result);
            return;
        }

        if let Err(e) = &result {
            warn!("Worker rejected {:?}: {}", message, e);
        }
        let _ = ack.send(result);
    }

    // Channel dropped without a shutdown; kill_on_drop reaps the child.
    debug!("Worker channel closed");
}

async fn write_line(
    stdin: &mut ChildStdin,
    message: &WorkerMessage,
) -> std::result::Result<(), String> {
    let mut line = serde_json::to_vec(message).map_err(|e| e.to_string())?;
    line.push(b'\n');
    stdin.write_all(&line).await.map_err(|e| e.to_string())?;
    stdin.flush().await.map_err(|e| e.to_string())
}

/// Ask the child to exit with SIGTERM.
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}
