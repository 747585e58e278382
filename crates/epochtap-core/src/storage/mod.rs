//! Snapshot stores and configuration.
//!
//! Every store exposes the full-snapshot `load`/`save` contract plus
//! entity-scoped `get`/`put`/`remove`. The tracker only uses the scoped
//! methods, so concurrent updates to different entities merge instead of
//! overwriting each other.

mod config;
mod json_file;
mod memory;
mod sqlite;

pub use config::{Config, NotificationsConfig, SchedulerConfig, StorageBackend, StorageConfig};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cycle::TrackedRecord;
use crate::error::StorageError;

/// Entity key to record.
pub type Snapshot = BTreeMap<String, TrackedRecord>;

pub trait SnapshotStore: Send + Sync {
    /// Read every record.
    fn load(&self) -> Result<Snapshot, StorageError>;

    /// Replace the whole snapshot.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Option<TrackedRecord>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    /// Insert or replace one record, leaving all others untouched.
    fn put(&self, key: &str, record: &TrackedRecord) -> Result<(), StorageError>;

    /// Remove one record. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Read-modify-write one record while holding the store's exclusive
    /// write lock.
    ///
    /// `f` is called exactly once with the current record (`None` when
    /// absent) and may change, replace or clear it. The slot is written back
    /// only if it changed. Writers sharing the backing file or database,
    /// including ones in other processes, are excluded for the whole call.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(&mut Option<TrackedRecord>),
    ) -> Result<(), StorageError>;
}

/// Returns the data directory.
///
/// `EPOCHTAP_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/epochtap[-dev]/`, with `EPOCHTAP_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("EPOCHTAP_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("EPOCHTAP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("epochtap-dev")
            } else {
                base_dir.join("epochtap")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Open the store selected by `config` inside `dir`.
///
/// # Errors
/// Returns an error if the SQLite database cannot be opened.
pub fn open_store(
    config: &StorageConfig,
    dir: &std::path::Path,
) -> Result<Box<dyn SnapshotStore>, StorageError> {
    let path = dir.join(config.file_name());
    match config.backend {
        StorageBackend::Json => Ok(Box::new(JsonFileStore::open(path))),
        StorageBackend::Sqlite => Ok(Box::new(SqliteStore::open(path)?)),
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must share.

    use super::*;
    use crate::cycle::RenewalPolicy;

    pub fn record(start: i64) -> TrackedRecord {
        TrackedRecord::new(start, format!("chat-{start}"), RenewalPolicy::Terminal)
    }

    pub fn put_get_remove(store: &dyn SnapshotStore) {
        assert!(store.get("a").unwrap().is_none());
        store.put("a", &record(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(record(1)));
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
    }

    pub fn put_merges_per_entity(store: &dyn SnapshotStore) {
        store.put("a", &record(1)).unwrap();
        store.put("b", &record(2)).unwrap();
        let mut updated = record(1);
        updated.tapped_epochs = 7;
        store.put("a", &updated).unwrap();

        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"].tapped_epochs, 7);
        assert_eq!(snapshot["b"], record(2));
    }

    pub fn update_rewrites_only_the_slot(store: &dyn SnapshotStore) {
        store.put("a", &record(1)).unwrap();
        store.put("b", &record(2)).unwrap();

        store
            .update("a", &mut |slot: &mut Option<TrackedRecord>| {
                if let Some(r) = slot.as_mut() {
                    r.tapped_epochs += 1;
                }
            })
            .unwrap();
        assert_eq!(store.get("a").unwrap().unwrap().tapped_epochs, 1);

        // Absent slot left absent: nothing is created.
        store
            .update("ghost", &mut |slot: &mut Option<TrackedRecord>| {
                assert!(slot.is_none());
            })
            .unwrap();
        assert!(store.get("ghost").unwrap().is_none());

        store
            .update("a", &mut |slot: &mut Option<TrackedRecord>| {
                *slot = None;
            })
            .unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["b"], record(2));
    }

    pub fn save_replaces_snapshot(store: &dyn SnapshotStore) {
        store.put("stale", &record(9)).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert("x".into(), record(3));
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }
}
