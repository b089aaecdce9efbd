//! Data models for storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed key of the single persisted record.
pub const STATE_KEY: &str = "state";

/// Lifecycle phase of the supervised background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No worker is running
    #[default]
    Stopped,
    /// Worker started, waiting for the user to record
    Initialized,
    /// Recording in progress
    Recording,
    /// Recording is being saved; the session is about to stop
    Saving,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Initialized => "initialized",
            Self::Recording => "recording",
            Self::Saving => "saving",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stopped" => Some(Self::Stopped),
            "initialized" => Some(Self::Initialized),
            "recording" => Some(Self::Recording),
            "saving" => Some(Self::Saving),
            _ => None,
        }
    }

    /// Whether a worker must be alive in this phase
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable row behind phase queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Always [`STATE_KEY`]
    pub key: String,

    /// Last completed phase
    pub phase: Phase,

    /// Output destination given at start
    pub destination: Option<String>,

    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}
