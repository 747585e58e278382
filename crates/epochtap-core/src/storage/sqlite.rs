//! SQLite-backed store: one row per entity, record stored as JSON.
//!
//! Read-modify-write goes through `BEGIN IMMEDIATE`, which takes the
//! database write lock up front, so a daemon and CLI processes sharing the
//! file serialize their updates instead of overwriting each other.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{Snapshot, SnapshotStore};
use crate::cycle::TrackedRecord;
use crate::error::StorageError;

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Locked)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                key     TEXT PRIMARY KEY,
                record  TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

fn encode(record: &TrackedRecord) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn decode(key: &str, json: &str) -> Result<TrackedRecord, StorageError> {
    serde_json::from_str(json).map_err(|e| StorageError::Corrupt(format!("entity '{key}': {e}")))
}

fn select(conn: &Connection, key: &str) -> Result<Option<TrackedRecord>, StorageError> {
    let json = conn
        .query_row(
            "SELECT record FROM entities WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    json.map(|j| decode(key, &j)).transpose()
}

fn upsert(tx: &Transaction<'_>, key: &str, record: &TrackedRecord) -> Result<(), StorageError> {
    tx.execute(
        "INSERT OR REPLACE INTO entities (key, record) VALUES (?1, ?2)",
        params![key, encode(record)?],
    )?;
    Ok(())
}

impl SnapshotStore for SqliteStore {
    fn load(&self) -> Result<Snapshot, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, record FROM entities")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = Snapshot::new();
        for row in rows {
            let (key, json) = row?;
            let record = decode(&key, &json)?;
            snapshot.insert(key, record);
        }
        Ok(snapshot)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM entities", [])?;
        for (key, record) in snapshot {
            upsert(&tx, key, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<TrackedRecord>, StorageError> {
        select(&*self.conn()?, key)
    }

    fn put(&self, key: &str, record: &TrackedRecord) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO entities (key, record) VALUES (?1, ?2)",
            params![key, encode(record)?],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM entities WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(&mut Option<TrackedRecord>),
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = select(&tx, key)?;
        let mut slot = current.clone();
        f(&mut slot);
        if slot != current {
            match &slot {
                Some(record) => upsert(&tx, key, record)?,
                None => {
                    tx.execute("DELETE FROM entities WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
