use std::path::Path;

use parking_lot::RwLock;

use crate::error::AppError;

pub const KEY_UNUSED_BLOBS: &[u8] = b"unused_blobs";
pub const KEY_BLOBS_TOTAL_SIZE: &[u8] = b"blobs_total_size";
pub const KEY_INDEXED_AT: &[u8] = b"indexed_at";
pub const KEY_CLEANED_AT: &[u8] = b"cleaned_at";

/// Durable key-value backing for the status ledger.
///
/// `get` with `Some(default)` is get-or-initialize: a missing key is seeded
/// with the default and the default is returned, so first-run state needs no
/// separate migration step. `get` with `None` reports the miss.
pub trait StatusStore: Send + Sync {
    fn get(&self, key: &[u8], default: Option<&[u8]>) -> Result<Vec<u8>, AppError>;
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), AppError>;
    fn close(&self) -> Result<(), AppError>;
}

/// Directory-backed store over sled. Reads share the lock; seeding writes,
/// `set` and `close` are exclusive against everything.
pub struct SledStore {
    inner: RwLock<Option<sled::Db>>,
}

impl SledStore {
    /// Opens the store at `path`, creating the directory on first run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let db = sled::open(path)?;
        Ok(Self {
            inner: RwLock::new(Some(db)),
        })
    }
}

impl StatusStore for SledStore {
    fn get(&self, key: &[u8], default: Option<&[u8]>) -> Result<Vec<u8>, AppError> {
        {
            let guard = self.inner.read();
            let db = guard.as_ref().ok_or(AppError::StorageClosed)?;
            if let Some(value) = db.get(key)? {
                return Ok(value.to_vec());
            }
        }

        let Some(default) = default else {
            return Err(AppError::KeyNotFound(
                String::from_utf8_lossy(key).into_owned(),
            ));
        };

        // Seed under the write lock; re-check in case a writer got there first.
        let guard = self.inner.write();
        let db = guard.as_ref().ok_or(AppError::StorageClosed)?;
        if let Some(value) = db.get(key)? {
            return Ok(value.to_vec());
        }
        db.insert(key, default)?;
        db.flush()?;
        Ok(default.to_vec())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), AppError> {
        let guard = self.inner.write();
        let db = guard.as_ref().ok_or(AppError::StorageClosed)?;
        db.insert(key, value)?;
        db.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<(), AppError> {
        let mut guard = self.inner.write();
        let db = guard.take().ok_or(AppError::StorageClosed)?;
        db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_with_default_seeds_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let value = store.get(b"counter", Some(b"0")).unwrap();
        assert_eq!(value, b"0");

        // A later read with a different default must see the seeded value.
        let value = store.get(b"counter", Some(b"99")).unwrap();
        assert_eq!(value, b"0");
    }

    #[test]
    fn get_without_default_reports_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        match store.get(b"missing", None) {
            Err(AppError::KeyNotFound(key)) => assert_eq!(key, "missing"),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.set(b"indexed_at", b"2024-05-01T00:00:00+00:00").unwrap();
        let value = store.get(b"indexed_at", None).unwrap();
        assert_eq!(value, b"2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.set(b"unused_blobs", b"42").unwrap();
            store.close().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"unused_blobs", Some(b"0")).unwrap(), b"42");
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.close().unwrap();

        assert!(matches!(
            store.get(b"k", Some(b"v")),
            Err(AppError::StorageClosed)
        ));
        assert!(matches!(store.set(b"k", b"v"), Err(AppError::StorageClosed)));
        assert!(matches!(store.close(), Err(AppError::StorageClosed)));
    }
}
