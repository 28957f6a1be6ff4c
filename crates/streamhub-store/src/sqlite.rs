//! SQLite-backed durable store.

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::backend::{PersistedRecord, PersistenceBackend};
use crate::error::StorageError;
use crate::StoreResult;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS state_records (
    key         TEXT PRIMARY KEY,
    payload     BLOB NOT NULL,
    written_at  TEXT NOT NULL
)";

/// Durable backend storing one row per state key.
///
/// Writes use `INSERT OR REPLACE`, so the table always holds the latest
/// record for each key.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute(SCHEMA, [])?;

        debug!(path = %path.as_ref().display(), "Opened state store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistenceBackend for SqliteBackend {
    fn store(&self, record: &PersistedRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO state_records (key, payload, written_at) VALUES (?1, ?2, ?3)",
            params![
                record.key,
                &record.payload[..],
                record.written_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Option<PersistedRecord>> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT payload, written_at FROM state_records WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, written_at)) = row else {
            return Ok(None);
        };

        let written_at = DateTime::parse_from_rfc3339(&written_at)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                detail: format!("bad timestamp: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(Some(PersistedRecord {
            key: key.to_string(),
            payload: Bytes::from(payload),
            written_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let backend = SqliteBackend::open_in_memory().unwrap();

        backend
            .store(&PersistedRecord::new("player.song", &br#"{"title":"x"}"#[..]))
            .unwrap();

        let loaded = backend.load("player.song").unwrap().unwrap();
        assert_eq!(&loaded.payload[..], br#"{"title":"x"}"#);
        assert_eq!(loaded.key, "player.song");
    }

    #[test]
    fn test_absence_is_not_an_error() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.load("never.written").unwrap().is_none());
    }

    #[test]
    fn test_last_write_wins_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend
                .store(&PersistedRecord::new("k", &b"old"[..]))
                .unwrap();
            backend
                .store(&PersistedRecord::new("k", &b"new"[..]))
                .unwrap();
        }

        let reopened = SqliteBackend::open(&path).unwrap();
        let loaded = reopened.load("k").unwrap().unwrap();
        assert_eq!(&loaded.payload[..], b"new");
    }

    #[test]
    fn test_corrupt_timestamp_is_reported() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        {
            let conn = backend.conn.lock();
            conn.execute(
                "INSERT INTO state_records (key, payload, written_at) VALUES ('bad', x'00', 'not-a-time')",
                [],
            )
            .unwrap();
        }

        match backend.load("bad") {
            Err(StorageError::Corrupt { key, .. }) => assert_eq!(key, "bad"),
            other => panic!("expected corrupt record error, got {other:?}"),
        }
    }
}
