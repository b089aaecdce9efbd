//! Owner of the single live worker

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorkerSettings;
use crate::lifecycle::LifecycleError;
use crate::storage::Phase;
use crate::worker::{Engine, WorkerChannel, WorkerMessage};

/// The one running worker instance
#[derive(Debug)]
pub struct TaskHandle {
    /// Session identifier for log correlation
    pub session_id: Uuid,

    /// Entrypoint the worker was launched from
    pub entrypoint: String,

    /// Output destination forwarded to the worker
    pub destination: String,

    /// When the worker acknowledged its destination
    pub started_at: DateTime<Utc>,

    channel: WorkerChannel,
}

/// Starts and stops the background execution engine.
///
/// Holds at most one [`TaskHandle`]. Nothing else may reach the worker.
pub struct WorkerSupervisor {
    engine: Arc<dyn Engine>,
    start_timeout: Duration,
    release_timeout: Duration,
    handle: Option<TaskHandle>,
    idle: watch::Sender<bool>,
}

impl WorkerSupervisor {
    pub fn new(engine: Arc<dyn Engine>, settings: &WorkerSettings) -> Self {
        Self::with_timeouts(engine, settings.start_timeout(), settings.release_timeout())
    }

    pub fn with_timeouts(
        engine: Arc<dyn Engine>,
        start_timeout: Duration,
        release_timeout: Duration,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            engine,
            start_timeout,
            release_timeout,
            handle: None,
            idle,
        }
    }

    /// Whether a worker is currently held
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&TaskHandle> {
        self.handle.as_ref()
    }

    /// Launch a worker for `entrypoint` and deliver `destination` as its first message.
    ///
    /// Bounded by the start timeout. Fails fast if a worker is already held.
    pub async fn acquire(
        &mut self,
        entrypoint: &str,
        destination: &str,
    ) -> Result<&TaskHandle, LifecycleError> {
        if self.handle.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let engine = Arc::clone(&self.engine);
        let launch = async move {
            let channel = engine.launch(entrypoint).await?;
            if let Err(e) = channel
                .send(WorkerMessage::Destination(destination.to_string()))
                .await
            {
                channel.abort();
                return Err(e);
            }
            Ok::<_, anyhow::Error>(channel)
        };

        let channel = match tokio::time::timeout(self.start_timeout, launch).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(LifecycleError::WorkerStartFailed(format!("{:#}", e))),
            Err(_) => {
                return Err(LifecycleError::WorkerStartFailed(format!(
                    "worker did not acknowledge within {:?}",
                    self.start_timeout
                )))
            }
        };

        let handle = TaskHandle {
            session_id: Uuid::new_v4(),
            entrypoint: entrypoint.to_string(),
            destination: destination.to_string(),
            started_at: Utc::now(),
            channel,
        };
        info!(
            "Worker started: {} ({} -> {})",
            handle.session_id, handle.entrypoint, handle.destination
        );

        self.idle.send_replace(false);
        Ok(self.handle.insert(handle))
    }

    /// Forward a phase change to the worker. Best effort.
    pub async fn notify(&self, phase: Phase) {
        let Some(handle) = &self.handle else {
            return;
        };

        match tokio::time::timeout(
            self.release_timeout,
            handle.channel.send(WorkerMessage::Phase(phase)),
        )
        .await
        {
            Ok(Ok(())) => debug!("Worker acknowledged phase {}", phase),
            Ok(Err(e)) => warn!("Worker did not accept phase {}: {:#}", phase, e),
            Err(_) => warn!("Worker did not acknowledge phase {} in time", phase),
        }
    }

    /// Tear the worker down.
    ///
    /// Always succeeds: shutdown errors and timeouts are logged and the worker
    /// is abandoned so the session can still reach `Stopped`.
    pub async fn release(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        let ran = Utc::now().signed_duration_since(handle.started_at);
        match tokio::time::timeout(self.release_timeout, handle.channel.shutdown()).await {
            Ok(Ok(())) => info!(
                "Worker stopped: {} after {}s",
                handle.session_id,
                ran.num_seconds()
            ),
            Ok(Err(e)) => warn!(
                "Worker {} failed to shut down cleanly: {:#}",
                handle.session_id, e
            ),
            Err(_) => warn!(
                "Worker {} did not shut down within {:?}, abandoning it",
                handle.session_id, self.release_timeout
            ),
        }
        handle.channel.abort();
    }

    /// Tell the host nothing is running any more.
    pub fn mark_idle(&self) {
        self.idle.send_replace(true);
    }

    /// Fires every time the session stops, including stops that found nothing running.
    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle.subscribe()
    }
}
