//! Configuration module for background-work
//!
//! Handles loading and managing application settings from TOML files.

mod settings;

pub use settings::{DaemonSettings, NotificationSettings, Settings, WorkerSettings};
