//! Background execution engine plumbing
//!
//! A worker is an isolated task (or child process) reached only through a
//! [`WorkerChannel`]. Every message is acknowledged by the worker.

pub mod engine;
pub mod supervisor;

pub use engine::{BuiltinEngine, EngineRegistry, ProcessEngine};
pub use supervisor::{TaskHandle, WorkerSupervisor};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::storage::Phase;

/// Messages the supervisor sends to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Where the worker should write its output; always the first message
    Destination(String),

    /// The session moved to a new phase
    Phase(Phase),

    /// Finish up and exit
    Shutdown,
}

/// A message plus the worker's acknowledgement slot
#[derive(Debug)]
pub struct Envelope {
    pub message: WorkerMessage,
    pub ack: oneshot::Sender<std::result::Result<(), String>>,
}

/// Command channel to one running worker.
///
/// Workers exit when the channel's sender side is dropped.
#[derive(Debug)]
pub struct WorkerChannel {
    tx: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl WorkerChannel {
    /// Spawn `run` as the worker body, handing it the receiving end.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(mpsc::Receiver<Envelope>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run(rx));
        Self { tx, task }
    }

    /// Send a message and wait for the worker to acknowledge it.
    pub async fn send(&self, message: WorkerMessage) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                message,
                ack: ack_tx,
            })
            .await
            .map_err(|_| anyhow!("worker channel closed"))?;

        ack_rx
            .await
            .map_err(|_| anyhow!("worker dropped the message"))?
            .map_err(|e| anyhow!(e))
    }

    /// Ask the worker to exit and wait for it to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.send(WorkerMessage::Shutdown).await?;
        (&mut self.task).await?;
        Ok(())
    }

    /// Stop the worker task without asking.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Something that can launch a worker for an entrypoint
#[async_trait]
pub trait Engine: Send + Sync {
    /// Resolve `entrypoint` and start an isolated worker for it.
    async fn launch(&self, entrypoint: &str) -> Result<WorkerChannel>;
}
