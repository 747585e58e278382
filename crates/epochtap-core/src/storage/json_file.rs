//! Single JSON file holding every record, keyed by entity.
//!
//! The file is the source of truth: each operation re-reads it, so the
//! daemon and short-lived CLI processes see each other's writes. Every
//! read-modify-write holds an exclusive lock on `<path>.lock`, and writes go
//! through a temp file in the same directory that is renamed into place, so
//! plain reads never see a partial file.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::warn;

use super::{Snapshot, SnapshotStore};
use crate::cycle::TrackedRecord;
use crate::error::StorageError;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

/// Held exclusive lock on the sidecar file; released on drop.
struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store. An unreadable or undecodable file is
    /// moved aside to `<path>.corrupt` and the store starts empty. Only
    /// `open` does this: later read failures surface as errors.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = Self {
            lock_path: sidecar_path(&path, "lock"),
            path,
            write_lock: Mutex::new(()),
        };
        let _lock = match store.lock_file() {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "opening snapshot without the write lock");
                None
            }
        };
        if let Err(e) = store.read() {
            let aside = sidecar_path(&store.path, "corrupt");
            warn!(path = %store.path.display(), error = %e, "unusable snapshot, starting empty");
            if let Err(rename_err) = std::fs::rename(&store.path, &aside) {
                warn!(path = %aside.display(), error = %rename_err, "could not move snapshot aside");
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Snapshot, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Snapshot::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let write_err = |source: std::io::Error| StorageError::Write {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn lock_file(&self) -> Result<FileLock, StorageError> {
        let lock_err = |source: std::io::Error| StorageError::Lock {
            path: self.lock_path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_err)?;
        FileExt::lock_exclusive(&file).map_err(lock_err)?;
        Ok(FileLock(file))
    }

    /// Read, apply `f`, and write back if anything changed, all under both
    /// the in-process mutex and the cross-process file lock.
    fn modify<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> Result<T, StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Corrupt("snapshot lock poisoned".into()))?;
        let _file_lock = self.lock_file()?;
        let mut snapshot = self.read()?;
        let before = snapshot.clone();
        let result = f(&mut snapshot);
        if snapshot != before {
            self.write(&snapshot)?;
        }
        Ok(result)
    }
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StorageError> {
        self.read()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.modify(|current| *current = snapshot.clone())
    }

    fn get(&self, key: &str) -> Result<Option<TrackedRecord>, StorageError> {
        Ok(self.read()?.remove(key))
    }

    fn put(&self, key: &str, record: &TrackedRecord) -> Result<(), StorageError> {
        self.modify(|snapshot| {
            snapshot.insert(key.to_string(), record.clone());
        })
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.modify(|snapshot| snapshot.remove(key).is_some())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(&mut Option<TrackedRecord>),
    ) -> Result<(), StorageError> {
        self.modify(|snapshot| {
            let mut slot = snapshot.remove(key);
            f(&mut slot);
            if let Some(record) = slot {
                snapshot.insert(key.to_string(), record);
            }
        })
    }
}
