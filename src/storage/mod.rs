//! Storage module for background-work
//!
//! Persists the current lifecycle phase in SQLite so it survives process death.

mod database;
mod models;

pub use database::Database;
pub use models::{Phase, PersistedRecord, STATE_KEY};

/// Durable single-record phase storage.
///
/// Writes are synchronous: when `write` returns `Ok` the record is on disk.
pub trait PhaseStore: Send + Sync {
    /// Upsert the single record.
    fn write(&self, phase: Phase, destination: Option<&str>) -> crate::Result<()>;

    /// Full record, `None` if never written or cleared.
    fn record(&self) -> crate::Result<Option<PersistedRecord>>;

    /// Remove the record without any transition.
    fn clear(&self) -> crate::Result<()>;

    /// Current phase, `Stopped` when absent.
    fn read(&self) -> crate::Result<Phase> {
        Ok(self.record()?.map(|r| r.phase).unwrap_or_default())
    }
}
