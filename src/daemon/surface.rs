//! The control surface: everything a foreign controller may do

use std::sync::Arc;
use tracing::{info, warn};

use crate::lifecycle::{Command, LifecycleController, LifecycleError};
use crate::notification::{present, Action, Prompt};
use crate::storage::{Phase, PhaseStore};

/// Entry point for controller commands and notification taps.
///
/// Commands go through the lifecycle controller; queries read the phase
/// store directly and never wait on a transition.
#[derive(Clone)]
pub struct ControlSurface {
    controller: Arc<LifecycleController>,
    store: Arc<dyn PhaseStore>,
}

impl ControlSurface {
    pub fn new(controller: Arc<LifecycleController>, store: Arc<dyn PhaseStore>) -> Self {
        Self { controller, store }
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub async fn submit(&self, command: Command) -> Result<Phase, LifecycleError> {
        self.controller.apply(command).await
    }

    pub async fn start(
        &self,
        entrypoint: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<Phase, LifecycleError> {
        self.submit(Command::Start {
            destination: destination.into(),
            entrypoint: entrypoint.into(),
        })
        .await
    }

    pub async fn record(&self) -> Result<Phase, LifecycleError> {
        self.submit(Command::Record).await
    }

    pub async fn save(&self) -> Result<Phase, LifecycleError> {
        self.submit(Command::Save).await
    }

    pub async fn stop(&self) -> Result<Phase, LifecycleError> {
        self.submit(Command::Stop).await
    }

    /// A button on the notification was tapped.
    pub async fn tap(&self, action: Action) -> Result<Phase, LifecycleError> {
        info!("Notification action: {}", action.label());
        self.submit(action.command()).await
    }

    /// Last completed phase, as any process would read it.
    pub fn query_phase(&self) -> Result<Phase, LifecycleError> {
        Ok(self.store.read()?)
    }

    /// Prompt for the last completed phase.
    pub fn prompt(&self) -> Result<Option<Prompt>, LifecycleError> {
        Ok(present(self.query_phase()?))
    }

    /// Forget the persisted phase without running any transition.
    pub fn reset_persisted_state(&self) -> Result<(), LifecycleError> {
        if self.controller.phase().is_active() {
            warn!(
                "Resetting persisted phase while a worker is live ({})",
                self.controller.phase()
            );
        }
        self.store.clear()?;
        info!("Persisted phase cleared");
        Ok(())
    }
}
