//! background-work - keeps a background recording session alive across
//! foreground restarts and keeps every controller agreeing on its phase.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod lifecycle;
pub mod notification;
pub mod storage;
pub mod worker;

use thiserror::Error;

/// Main error type for background-work
#[derive(Error, Debug)]
pub enum BackgroundWorkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackgroundWorkError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "background-work";
