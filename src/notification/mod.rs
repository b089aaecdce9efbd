//! User-facing prompts for the current phase
//!
//! Rendering is a pure function of the phase. Action taps come back in as
//! lifecycle commands.

mod presenter;

pub use presenter::{NotificationPresenter, Notifier, TracingNotifier};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::lifecycle::Command;
use crate::storage::Phase;

/// Id of the ongoing session prompt
pub const SESSION_PROMPT_ID: u32 = 1;

/// Id of the one-shot "saved" confirmation
pub const SAVED_PROMPT_ID: u32 = 2;

/// A button on a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Record,
    Save,
    Stop,
}

impl Action {
    /// The command a tap on this button submits
    pub fn command(&self) -> Command {
        match self {
            Action::Record => Command::Record,
            Action::Save => Command::Save,
            Action::Stop => Command::Stop,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Record => "Record",
            Action::Save => "Save",
            Action::Stop => "Stop",
        }
    }
}

/// What the user sees for a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: u32,
    pub title: String,
    pub body: String,
    pub actions: Vec<Action>,

    /// Stays until replaced; otherwise the user may dismiss it
    pub ongoing: bool,

    /// Tapping the body opens the controller; it never submits a command
    pub open_controller: bool,
}

/// Render `phase`. `Stopped` has no prompt.
pub fn present(phase: Phase) -> Option<Prompt> {
    let (id, title, body, actions, ongoing) = match phase {
        Phase::Stopped => return None,
        Phase::Initialized => (
            SESSION_PROMPT_ID,
            "Background work started",
            "Press record to start recording",
            vec![Action::Record, Action::Stop],
            true,
        ),
        Phase::Recording => (
            SESSION_PROMPT_ID,
            "Recording in progress",
            "Press stop to save the recording.",
            vec![Action::Save, Action::Stop],
            true,
        ),
        Phase::Saving => (
            SAVED_PROMPT_ID,
            "Recording saved",
            "The recording was saved",
            Vec::new(),
            false,
        ),
    };

    Some(Prompt {
        id,
        title: title.to_string(),
        body: body.to_string(),
        actions,
        ongoing,
        open_controller: true,
    })
}
