//! The lifecycle state machine
//!
//! | Current  | Command | New         | Effect                                        |
//! |----------|---------|-------------|-----------------------------------------------|
//! | Stopped  | Start   | Initialized | acquire worker, persist, show "started"       |
//! | active   | Start   | -           | `AlreadyRunning`                              |
//! | active   | Record  | Recording   | persist, show "recording"                     |
//! | active   | Save    | Stopped     | persist `Saving`, show "saved", then Stop     |
//! | active   | Stop    | Stopped     | persist, release worker                       |
//! | Stopped  | Stop    | Stopped     | no write, signal host idle                    |
//! | Stopped  | Record  | Stopped     | [`IdleCommandPolicy`]                         |
//! | Stopped  | Save    | Stopped     | [`IdleCommandPolicy`]                         |

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::lifecycle::{Command, LifecycleError};
use crate::notification::NotificationPresenter;
use crate::storage::{Phase, PhaseStore};
use crate::worker::WorkerSupervisor;

/// What `Record` and `Save` do when no task is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleCommandPolicy {
    /// Behave exactly like `Stop` on a stopped task: nothing is written
    #[default]
    TreatAsStop,

    /// Fail with `NotRunning`
    Reject,
}

/// Serializes every phase transition for the single supervised task
pub struct LifecycleController {
    supervisor: Mutex<WorkerSupervisor>,
    store: Arc<dyn PhaseStore>,
    presenter: NotificationPresenter,
    idle_policy: IdleCommandPolicy,
    phase: watch::Sender<Phase>,
    idle: watch::Receiver<bool>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn PhaseStore>,
        supervisor: WorkerSupervisor,
        presenter: NotificationPresenter,
    ) -> Self {
        match store.read() {
            Ok(phase) if phase.is_active() => warn!(
                "Persisted phase is {} but no worker is running; reset it once confirmed stale",
                phase
            ),
            Ok(_) => {}
            Err(e) => warn!("Could not read persisted phase: {}", e),
        }

        let idle = supervisor.subscribe_idle();
        let (phase, _) = watch::channel(Phase::Stopped);

        Self {
            supervisor: Mutex::new(supervisor),
            store,
            presenter,
            idle_policy: IdleCommandPolicy::default(),
            phase,
            idle,
        }
    }

    pub fn with_idle_policy(mut self, policy: IdleCommandPolicy) -> Self {
        self.idle_policy = policy;
        self
    }

    /// In-memory phase of the task owned by this controller
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Changes every time a stop is applied; the host may exit then
    pub fn watch_idle(&self) -> watch::Receiver<bool> {
        self.idle.clone()
    }

    /// Apply one command. Commands never interleave.
    pub async fn apply(&self, command: Command) -> Result<Phase, LifecycleError> {
        let mut supervisor = self.supervisor.lock().await;
        debug!("Applying {} in phase {}", command.name(), self.phase());

        match command {
            Command::Start {
                destination,
                entrypoint,
            } => self.start(&mut supervisor, &destination, &entrypoint).await,
            Command::Record => self.advance(&mut supervisor, Phase::Recording).await,
            Command::Save => {
                let phase = self.advance(&mut supervisor, Phase::Saving).await?;
                if phase == Phase::Saving {
                    self.stop(&mut supervisor).await
                } else {
                    Ok(phase)
                }
            }
            Command::Stop => self.stop(&mut supervisor).await,
        }
    }

    /// Stop whatever is running. Used when the host goes away.
    pub async fn shutdown(&self) -> Result<Phase, LifecycleError> {
        self.apply(Command::Stop).await
    }

    async fn start(
        &self,
        supervisor: &mut WorkerSupervisor,
        destination: &str,
        entrypoint: &str,
    ) -> Result<Phase, LifecycleError> {
        if supervisor.is_active() {
            return Err(LifecycleError::AlreadyRunning);
        }

        supervisor.acquire(entrypoint, destination).await?;

        if let Err(e) = self.persist(Phase::Initialized, Some(destination)) {
            supervisor.release().await;
            return Err(e);
        }

        self.enter(supervisor, Phase::Initialized).await;
        info!("Session started: {}", destination);
        Ok(Phase::Initialized)
    }

    async fn advance(
        &self,
        supervisor: &mut WorkerSupervisor,
        next: Phase,
    ) -> Result<Phase, LifecycleError> {
        if !supervisor.is_active() {
            return match self.idle_policy {
                IdleCommandPolicy::TreatAsStop => {
                    debug!("No task running; treating {} as stop", next);
                    self.stop(supervisor).await
                }
                IdleCommandPolicy::Reject => Err(LifecycleError::NotRunning),
            };
        }

        self.persist(next, None)?;
        self.enter(supervisor, next).await;
        Ok(next)
    }

    async fn stop(&self, supervisor: &mut WorkerSupervisor) -> Result<Phase, LifecycleError> {
        if !supervisor.is_active() {
            supervisor.mark_idle();
            return Ok(Phase::Stopped);
        }

        self.persist(Phase::Stopped, None)?;
        supervisor.notify(Phase::Stopped).await;
        supervisor.release().await;

        self.phase.send_replace(Phase::Stopped);
        self.presenter.refresh(Phase::Stopped);
        supervisor.mark_idle();

        info!("Session stopped");
        Ok(Phase::Stopped)
    }

    /// Commit an already-persisted phase to memory, the worker and the prompt.
    async fn enter(&self, supervisor: &WorkerSupervisor, phase: Phase) {
        self.phase.send_replace(phase);
        supervisor.notify(phase).await;
        self.presenter.refresh(phase);
    }

    fn persist(&self, phase: Phase, destination: Option<&str>) -> Result<(), LifecycleError> {
        self.store.write(phase, destination).map_err(|e| {
            warn!("Failed to persist phase {}: {}", phase, e);
            LifecycleError::from(e)
        })
    }
}
