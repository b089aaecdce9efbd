//! SQLite-backed phase store

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::config::Settings;
use crate::storage::models::{Phase, PersistedRecord, STATE_KEY};
use crate::storage::PhaseStore;
use crate::BackgroundWorkError;

/// Database wrapper for background-work
pub struct Database {
    conn: Mutex<Connection>,
}

const CURRENT_SCHEMA_VERSION: i64 = 1;

impl Database {
    /// Open or create the database
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.database_path();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open_path(&db_path)
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // A write must be on disk before the transition that caused it completes.
        conn.pragma_update(None, "synchronous", "FULL")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    fn conn(&self) -> crate::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BackgroundWorkError::Storage("database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let current_version = self.schema_version()?;
        if current_version > CURRENT_SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is newer than supported version {}",
                current_version,
                CURRENT_SCHEMA_VERSION
            );
        }

        if current_version < 1 {
            self.migrate_to_v1()?;
            self.set_schema_version(1)?;
        }

        Ok(())
    }

    /// Current schema version tracked in PRAGMA user_version.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn()?
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?)
    }

    fn set_schema_version(&self, version: i64) -> Result<()> {
        self.conn()?
            .execute(&format!("PRAGMA user_version = {}", version), [])?;
        Ok(())
    }

    fn migrate_to_v1(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                phase TEXT NOT NULL,
                destination TEXT,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

impl PhaseStore for Database {
    fn write(&self, phase: Phase, destination: Option<&str>) -> crate::Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO state (key, phase, destination, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                phase = excluded.phase,
                destination = COALESCE(excluded.destination, state.destination),
                updated_at = excluded.updated_at
            "#,
            params![STATE_KEY, phase.as_str(), destination, Utc::now().timestamp()],
        )?;

        Ok(())
    }

    fn record(&self) -> crate::Result<Option<PersistedRecord>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT key, phase, destination, updated_at FROM state WHERE key = ?1",
                params![STATE_KEY],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, phase, destination, updated_at)) = row else {
            return Ok(None);
        };

        let phase = Phase::parse(&phase).ok_or_else(|| {
            BackgroundWorkError::Storage(format!("unknown phase in record: {}", phase))
        })?;

        Ok(Some(PersistedRecord {
            key,
            phase,
            destination,
            updated_at: Utc
                .timestamp_opt(updated_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }))
    }

    fn clear(&self) -> crate::Result<()> {
        self.conn()?
            .execute("DELETE FROM state WHERE key = ?1", params![STATE_KEY])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_record_reads_as_stopped() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.record().unwrap(), None);
        assert_eq!(db.read().unwrap(), Phase::Stopped);
        assert_eq!(db.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn write_keeps_destination_when_omitted() {
        let db = Database::open_memory().unwrap();
        db.write(Phase::Initialized, Some("/tmp/take-1.wav")).unwrap();
        db.write(Phase::Recording, None).unwrap();

        let record = db.record().unwrap().expect("record written");
        assert_eq!(record.key, STATE_KEY);
        assert_eq!(record.phase, Phase::Recording);
        assert_eq!(record.destination.as_deref(), Some("/tmp/take-1.wav"));
    }

    #[test]
    fn clear_removes_record() {
        let db = Database::open_memory().unwrap();
        db.write(Phase::Recording, Some("out.wav")).unwrap();
        db.clear().unwrap();
        assert_eq!(db.read().unwrap(), Phase::Stopped);
        // clearing twice is fine
        db.clear().unwrap();
    }

    #[test]
    fn unknown_phase_is_reported() {
        let db = Database::open_memory().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO state (key, phase, updated_at) VALUES (?1, 'paused', 0)",
                params![STATE_KEY],
            )
            .unwrap();
        assert!(db.read().is_err());
    }
}
