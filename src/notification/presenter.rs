//! Pushes rendered prompts to a notifier

use std::sync::Arc;
use tracing::info;

use crate::notification::{present, Prompt, SESSION_PROMPT_ID};
use crate::storage::Phase;

/// Displays prompts somewhere the user can see them
pub trait Notifier: Send + Sync {
    fn show(&self, prompt: &Prompt);
    fn dismiss(&self, id: u32);
}

/// Writes prompts to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(&self, prompt: &Prompt) {
        let actions: Vec<&str> = prompt.actions.iter().map(|a| a.label()).collect();
        info!(
            "[notification {}] {} - {} {:?}",
            prompt.id, prompt.title, prompt.body, actions
        );
    }

    fn dismiss(&self, id: u32) {
        info!("[notification {}] dismissed", id);
    }
}

/// Re-renders the prompt for a phase. Holds no phase of its own.
#[derive(Clone)]
pub struct NotificationPresenter {
    notifier: Arc<dyn Notifier>,
    enabled: bool,
}

impl NotificationPresenter {
    pub fn new(notifier: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self { notifier, enabled }
    }

    /// A presenter that shows nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(TracingNotifier), false)
    }

    pub fn refresh(&self, phase: Phase) {
        if !self.enabled {
            return;
        }

        match present(phase) {
            Some(prompt) => self.notifier.show(&prompt),
            None => self.notifier.dismiss(SESSION_PROMPT_ID),
        }
    }
}
