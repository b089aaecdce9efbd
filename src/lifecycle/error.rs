//! Lifecycle error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned to whoever submitted a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("A background task is already running")]
    AlreadyRunning,

    #[error("No background task is running")]
    NotRunning,

    #[error("Worker failed to start: {0}")]
    WorkerStartFailed(String),

    #[error("Failed to persist phase: {0}")]
    PersistenceFailed(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Wire-level discriminant of [`LifecycleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyRunning,
    NotRunning,
    WorkerStartFailed,
    PersistenceFailed,
    NotImplemented,
    Internal,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::NotRunning => ErrorKind::NotRunning,
            Self::WorkerStartFailed(_) => ErrorKind::WorkerStartFailed,
            Self::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }
}

impl From<crate::BackgroundWorkError> for LifecycleError {
    fn from(err: crate::BackgroundWorkError) -> Self {
        Self::PersistenceFailed(err.to_string())
    }
}
