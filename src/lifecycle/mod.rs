//! Recording lifecycle state machine
//!
//! The controller is the only thing that changes the phase or touches the
//! worker. Every command goes through [`LifecycleController::apply`].

pub mod controller;
pub mod error;

pub use controller::{IdleCommandPolicy, LifecycleController};
pub use error::{ErrorKind, LifecycleError};

use serde::{Deserialize, Serialize};

/// A request to change the session phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Launch the worker bound to `entrypoint` and hand it `destination`
    Start {
        destination: String,
        entrypoint: String,
    },

    /// Begin (or keep) recording
    Record,

    /// Save the recording; ends the session
    Save,

    /// Tear the session down
    Stop,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Record => "record",
            Command::Save => "save",
            Command::Stop => "stop",
        }
    }
}
