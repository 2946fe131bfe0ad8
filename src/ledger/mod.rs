pub mod store;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use store::{
    KEY_BLOBS_TOTAL_SIZE, KEY_CLEANED_AT, KEY_INDEXED_AT, KEY_UNUSED_BLOBS, StatusStore,
};

/// Externally visible collection status. `is_alive` is derived on every status
/// read and never persisted; the other four fields are backed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_alive: bool,
    pub unused_blobs: u64,
    pub blobs_total_size: u64,
    pub blobs_indexed_at: String,
    pub blobs_cleaned_at: String,
}

impl Status {
    fn initial() -> Self {
        let epoch = format_timestamp(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            is_alive: true,
            unused_blobs: 0,
            blobs_total_size: 0,
            blobs_indexed_at: epoch.clone(),
            blobs_cleaned_at: epoch,
        }
    }
}

/// Sparse status update. Fields are applied in declaration order; the first
/// failing field aborts the rest, so a failed update may be partially durable.
#[derive(Debug, Default, Clone)]
pub struct StatusUpdate {
    pub unused_blobs: Option<u64>,
    pub blobs_total_size: Option<u64>,
    pub blobs_indexed_at: Option<DateTime<Utc>>,
    pub blobs_cleaned_at: Option<DateTime<Utc>>,
}

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Typed, write-through view over the status store. Every setter persists
/// first and only mutates the in-memory snapshot once the write succeeded, so
/// the snapshot never claims durability it does not have.
pub struct StatusLedger {
    store: Arc<dyn StatusStore>,
    status: RwLock<Status>,
}

impl StatusLedger {
    /// Seeds all persisted fields via get-or-initialize and restores the
    /// snapshot from whatever the store already holds.
    pub fn initialize(store: Arc<dyn StatusStore>) -> Result<Self, AppError> {
        let mut status = Status::initial();

        let raw = store.get(KEY_UNUSED_BLOBS, Some(status.unused_blobs.to_string().as_bytes()))?;
        status.unused_blobs = parse_u64(KEY_UNUSED_BLOBS, &raw)?;

        let raw = store.get(
            KEY_BLOBS_TOTAL_SIZE,
            Some(status.blobs_total_size.to_string().as_bytes()),
        )?;
        status.blobs_total_size = parse_u64(KEY_BLOBS_TOTAL_SIZE, &raw)?;

        let raw = store.get(KEY_INDEXED_AT, Some(status.blobs_indexed_at.as_bytes()))?;
        status.blobs_indexed_at = parse_string(KEY_INDEXED_AT, raw)?;

        let raw = store.get(KEY_CLEANED_AT, Some(status.blobs_cleaned_at.as_bytes()))?;
        status.blobs_cleaned_at = parse_string(KEY_CLEANED_AT, raw)?;

        Ok(Self {
            store,
            status: RwLock::new(status),
        })
    }

    pub fn snapshot(&self) -> Status {
        self.status.read().clone()
    }

    /// In-memory only: liveness is re-derived on every status read and would
    /// be stale the instant the process restarts.
    pub fn set_is_alive(&self, is_alive: bool) {
        self.status.write().is_alive = is_alive;
    }

    pub fn set_unused_blobs(&self, unused_blobs: u64) -> Result<(), AppError> {
        self.store
            .set(KEY_UNUSED_BLOBS, unused_blobs.to_string().as_bytes())?;
        self.status.write().unused_blobs = unused_blobs;
        Ok(())
    }

    pub fn set_blobs_total_size(&self, total_size: u64) -> Result<(), AppError> {
        self.store
            .set(KEY_BLOBS_TOTAL_SIZE, total_size.to_string().as_bytes())?;
        self.status.write().blobs_total_size = total_size;
        Ok(())
    }

    pub fn set_blobs_indexed_at(&self, indexed_at: DateTime<Utc>) -> Result<(), AppError> {
        let formatted = format_timestamp(indexed_at);
        self.store.set(KEY_INDEXED_AT, formatted.as_bytes())?;
        self.status.write().blobs_indexed_at = formatted;
        Ok(())
    }

    pub fn set_blobs_cleaned_at(&self, cleaned_at: DateTime<Utc>) -> Result<(), AppError> {
        let formatted = format_timestamp(cleaned_at);
        self.store.set(KEY_CLEANED_AT, formatted.as_bytes())?;
        self.status.write().blobs_cleaned_at = formatted;
        Ok(())
    }

    /// Applies the provided fields in a fixed order, stopping at the first
    /// failure. Callers must treat an error as "some but not all fields were
    /// durably updated".
    pub fn apply_update(&self, update: &StatusUpdate) -> Result<(), AppError> {
        let result = self.apply_fields(update);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "status update failed part way through");
        }
        result
    }

    fn apply_fields(&self, update: &StatusUpdate) -> Result<(), AppError> {
        if let Some(unused_blobs) = update.unused_blobs {
            self.set_unused_blobs(unused_blobs)?;
        }
        if let Some(total_size) = update.blobs_total_size {
            self.set_blobs_total_size(total_size)?;
        }
        if let Some(indexed_at) = update.blobs_indexed_at {
            self.set_blobs_indexed_at(indexed_at)?;
        }
        if let Some(cleaned_at) = update.blobs_cleaned_at {
            self.set_blobs_cleaned_at(cleaned_at)?;
        }
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), AppError> {
        self.store.close()
    }
}

fn parse_u64(key: &[u8], raw: &[u8]) -> Result<u64, AppError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| AppError::Parse {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: format!("expected decimal integer, got {:?}", String::from_utf8_lossy(raw)),
        })
}

fn parse_string(key: &[u8], raw: Vec<u8>) -> Result<String, AppError> {
    String::from_utf8(raw).map_err(|err| AppError::Parse {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::store::SledStore;
    use super::*;
    use chrono::TimeZone;

    /// Store wrapper that fails every write to the named key, for exercising
    /// partial-update semantics.
    struct FailingKeyStore {
        inner: SledStore,
        poisoned_key: &'static [u8],
    }

    impl StatusStore for FailingKeyStore {
        fn get(&self, key: &[u8], default: Option<&[u8]>) -> Result<Vec<u8>, AppError> {
            self.inner.get(key, default)
        }

        fn set(&self, key: &[u8], value: &[u8]) -> Result<(), AppError> {
            if key == self.poisoned_key {
                return Err(AppError::StorageClosed);
            }
            self.inner.set(key, value)
        }

        fn close(&self) -> Result<(), AppError> {
            self.inner.close()
        }
    }

    fn fresh_ledger(dir: &std::path::Path) -> StatusLedger {
        StatusLedger::initialize(Arc::new(SledStore::open(dir).unwrap())).unwrap()
    }

    #[test]
    fn initialize_seeds_defaults_on_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(dir.path());

        let status = ledger.snapshot();
        assert!(status.is_alive);
        assert_eq!(status.unused_blobs, 0);
        assert_eq!(status.blobs_total_size, 0);
        assert_eq!(status.blobs_indexed_at, "1970-01-01T00:00:00Z");
        assert_eq!(status.blobs_cleaned_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn initialize_restores_persisted_fields() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = fresh_ledger(dir.path());
            ledger.set_unused_blobs(7).unwrap();
            ledger.set_blobs_total_size(1234).unwrap();
            let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            ledger.set_blobs_indexed_at(t).unwrap();
            ledger.shutdown().unwrap();
        }

        let ledger = fresh_ledger(dir.path());
        let status = ledger.snapshot();
        assert_eq!(status.unused_blobs, 7);
        assert_eq!(status.blobs_total_size, 1234);
        assert_eq!(status.blobs_indexed_at, "2024-05-01T12:00:00Z");
        // Never touched, still the sentinel.
        assert_eq!(status.blobs_cleaned_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn is_alive_is_never_persisted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = fresh_ledger(dir.path());
            ledger.set_is_alive(false);
            ledger.shutdown().unwrap();
        }

        let ledger = fresh_ledger(dir.path());
        assert!(ledger.snapshot().is_alive);
    }

    #[test]
    fn apply_update_stops_at_first_failing_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FailingKeyStore {
            inner: SledStore::open(dir.path()).unwrap(),
            poisoned_key: KEY_BLOBS_TOTAL_SIZE,
        });
        let ledger = StatusLedger::initialize(store.clone()).unwrap();

        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let update = StatusUpdate {
            unused_blobs: Some(3),
            blobs_total_size: Some(999),
            blobs_indexed_at: Some(t),
            blobs_cleaned_at: None,
        };
        assert!(ledger.apply_update(&update).is_err());

        // First field is durable, the failing one and everything after are not.
        assert_eq!(store.get(KEY_UNUSED_BLOBS, None).unwrap(), b"3");
        assert_eq!(store.get(KEY_BLOBS_TOTAL_SIZE, None).unwrap(), b"0");
        assert_eq!(store.get(KEY_INDEXED_AT, None).unwrap(), b"1970-01-01T00:00:00Z");

        let status = ledger.snapshot();
        assert_eq!(status.unused_blobs, 3);
        assert_eq!(status.blobs_total_size, 0);
        assert_eq!(status.blobs_indexed_at, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn status_serializes_with_wire_field_names() {
        let status = Status::initial();
        let json = serde_json::to_value(&status).unwrap();
        for key in [
            "isAlive",
            "unusedBlobs",
            "blobsTotalSize",
            "blobsIndexedAt",
            "blobsCleanedAt",
        ] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
    }
}
