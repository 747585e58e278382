use std::sync::Mutex;

use super::{Snapshot, SnapshotStore};
use crate::cycle::TrackedRecord;
use crate::error::StorageError;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Snapshot>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Corrupt("memory store lock poisoned".into()))
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StorageError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        *self.lock()? = snapshot.clone();
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<TrackedRecord>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, record: &TrackedRecord) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(&mut Option<TrackedRecord>),
    ) -> Result<(), StorageError> {
        let mut records = self.lock()?;
        let mut slot = records.remove(key);
        f(&mut slot);
        if let Some(record) = slot {
            records.insert(key.to_string(), record);
        }
        Ok(())
    }
}
