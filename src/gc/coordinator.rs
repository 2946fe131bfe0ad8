use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::collector::GarbageCollector;
use super::scheduler::spawn_cron_job;
use crate::error::AppError;
use crate::ledger::{StatusLedger, StatusUpdate};
use crate::storage::BlobSizeReader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbageBlob {
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbageListing {
    pub blobs: Vec<GarbageBlob>,
}

/// Binds engine, ledger and the blob-size lookup into the user-facing
/// operations and the two scheduled jobs.
///
/// The drain lock exists solely for graceful shutdown: every handler and
/// scheduled run takes a shared hold, shutdown takes the exclusive hold and
/// thereby waits out everything in flight before tearing the components down.
#[derive(Clone)]
pub struct GcCoordinator {
    collector: GarbageCollector,
    ledger: Arc<StatusLedger>,
    blob_sizes: Arc<BlobSizeReader>,
    drain: Arc<RwLock<()>>,
    jobs: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl GcCoordinator {
    pub fn new(
        collector: GarbageCollector,
        ledger: Arc<StatusLedger>,
        blob_sizes: Arc<BlobSizeReader>,
    ) -> Self {
        Self {
            collector,
            ledger,
            blob_sizes,
            drain: Arc::new(RwLock::new(())),
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    /// Registers the index and removal jobs on their cron schedules. Both
    /// specs must parse before anything is registered; re-enabling replaces
    /// all prior entries.
    pub fn enable_schedule(&self, index_spec: &str, removal_spec: &str) -> Result<(), AppError> {
        let index = Schedule::from_str(index_spec)?;
        let removal = Schedule::from_str(removal_spec)?;

        self.disable_schedule();

        let this = self.clone();
        let index_job = spawn_cron_job(index, "index", move || {
            let this = this.clone();
            async move { this.index_garbage().await }
        });
        let this = self.clone();
        let removal_job = spawn_cron_job(removal, "removal", move || {
            let this = this.clone();
            async move { this.remove_garbage().await }
        });

        self.jobs.lock().extend([index_job, removal_job]);
        Ok(())
    }

    pub fn disable_schedule(&self) {
        for job in self.jobs.lock().drain(..) {
            job.abort();
        }
    }

    #[cfg(test)]
    fn scheduled_job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Scheduled index run: waits for the execution slot rather than skipping
    /// the tick.
    pub async fn index_garbage(&self) -> Result<(), AppError> {
        let _hold = self.drain.read().await;
        let now = Utc::now();
        let digests = self.collector.list_garbage().await?;
        let sizes = self.blob_sizes.blob_sizes(&digests).await?;
        self.ledger.apply_update(&StatusUpdate {
            unused_blobs: Some(digests.len() as u64),
            blobs_total_size: Some(sizes.total),
            blobs_indexed_at: Some(now),
            blobs_cleaned_at: None,
        })
    }

    /// Scheduled removal run.
    pub async fn remove_garbage(&self) -> Result<(), AppError> {
        let _hold = self.drain.read().await;
        let now = Utc::now();
        self.collector.remove_garbage().await?;
        self.ledger.apply_update(&cleaned_update(now))
    }

    /// HTTP-facing listing: fails fast with `CollectorBusy` when a run is in
    /// flight, and performs no store write in that case.
    pub async fn get_garbage(&self) -> Result<GarbageListing, AppError> {
        let _hold = self.drain.read().await;
        let now = Utc::now();
        let digests = self.collector.try_list_garbage().await?;
        let sizes = self.blob_sizes.blob_sizes(&digests).await?;

        // The listing is already computed; a failed ledger update is logged
        // by the ledger and repaired by the next run.
        let _ = self.ledger.apply_update(&StatusUpdate {
            unused_blobs: Some(digests.len() as u64),
            blobs_total_size: Some(sizes.total),
            blobs_indexed_at: Some(now),
            blobs_cleaned_at: None,
        });

        let blobs = digests
            .into_iter()
            .zip(sizes.sizes)
            .map(|(digest, size)| GarbageBlob { digest, size })
            .collect();
        Ok(GarbageListing { blobs })
    }

    /// HTTP-facing removal.
    pub async fn delete_garbage(&self) -> Result<(), AppError> {
        let _hold = self.drain.read().await;
        let now = Utc::now();
        self.collector.try_remove_garbage().await?;
        self.ledger.apply_update(&cleaned_update(now))
    }

    /// Drains in-flight handlers and jobs, then tears everything down.
    /// Sub-shutdown failures are logged, never raised: process exit must not
    /// hang on a wedged component beyond its deadline.
    pub async fn shutdown(&self, deadline: Duration) {
        let _hold = self.drain.write().await;
        self.disable_schedule();
        if let Err(err) = self.ledger.shutdown() {
            tracing::error!(error = %err, "status ledger shutdown failed");
        }
        if let Err(err) = self.collector.shutdown(deadline).await {
            tracing::error!(error = %err, "collection engine shutdown failed");
        }
    }
}

/// A successful removal implies a fresh index with zero remaining garbage:
/// both timestamps move together and the counts reset.
fn cleaned_update(now: DateTime<Utc>) -> StatusUpdate {
    StatusUpdate {
        unused_blobs: Some(0),
        blobs_total_size: Some(0),
        blobs_indexed_at: Some(now),
        blobs_cleaned_at: Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::store::SledStore;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn stub_docker(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn write_blob(mount: &Path, hex: &str, len: usize) {
        let dir = mount
            .join("docker/registry/v2/blobs/sha256")
            .join(&hex[..2])
            .join(hex);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data"), vec![0u8; len]).unwrap();
    }

    fn coordinator(dir: &Path, docker_body: &str) -> GcCoordinator {
        let docker = stub_docker(dir, docker_body);
        let collector =
            GarbageCollector::new("registry", "registry-ro", "/etc/registry/config.yml")
                .with_docker_bin(docker);
        let store = Arc::new(SledStore::open(dir.join("store")).unwrap());
        let ledger = Arc::new(StatusLedger::initialize(store).unwrap());
        let blob_sizes = Arc::new(BlobSizeReader::new(dir.join("mnt")));
        GcCoordinator::new(collector, ledger, blob_sizes)
    }

    #[tokio::test]
    async fn get_garbage_lists_blobs_and_updates_ledger() {
        let dir = tempfile::tempdir().unwrap();
        write_blob(&dir.path().join("mnt"), "aa", 10);
        write_blob(&dir.path().join("mnt"), "bb", 20);
        let coordinator = coordinator(
            dir.path(),
            "if [ \"$1\" = exec ]; then\n\
               echo 'blob eligible for deletion: sha256:aa'\n\
               echo 'blob eligible for deletion: sha256:bb'\n\
             fi",
        );

        let listing = coordinator.get_garbage().await.unwrap();
        assert_eq!(
            listing,
            GarbageListing {
                blobs: vec![
                    GarbageBlob {
                        digest: "sha256:aa".into(),
                        size: 10
                    },
                    GarbageBlob {
                        digest: "sha256:bb".into(),
                        size: 20
                    },
                ]
            }
        );

        let status = coordinator.ledger().snapshot();
        assert_eq!(status.unused_blobs, 2);
        assert_eq!(status.blobs_total_size, 30);
        assert_ne!(status.blobs_indexed_at, "1970-01-01T00:00:00Z");
        assert_eq!(status.blobs_cleaned_at, "1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn delete_garbage_zeroes_counts_and_stamps_both_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), "exit 0");

        coordinator.ledger().set_unused_blobs(5).unwrap();
        coordinator.ledger().set_blobs_total_size(500).unwrap();

        coordinator.delete_garbage().await.unwrap();

        let status = coordinator.ledger().snapshot();
        assert_eq!(status.unused_blobs, 0);
        assert_eq!(status.blobs_total_size, 0);
        assert_eq!(status.blobs_indexed_at, status.blobs_cleaned_at);
        assert_ne!(status.blobs_cleaned_at, "1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn busy_engine_means_no_ledger_write() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), "sleep 0.3");

        let before = coordinator.ledger().snapshot();
        let (slow, fast) = tokio::join!(coordinator.delete_garbage(), coordinator.get_garbage());

        assert!(matches!(fast, Err(AppError::CollectorBusy)));
        assert!(slow.is_ok());

        // Only the removal touched the ledger; the busy GET wrote nothing.
        let after = coordinator.ledger().snapshot();
        assert_eq!(after.unused_blobs, 0);
        assert_ne!(after.blobs_cleaned_at, before.blobs_cleaned_at);
    }

    #[tokio::test]
    async fn enable_schedule_rejects_invalid_specs_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), "exit 0");

        assert!(
            coordinator
                .enable_schedule("0 0 3 * * *", "not a cron spec")
                .is_err()
        );
        assert_eq!(coordinator.scheduled_job_count(), 0);
    }

    #[tokio::test]
    async fn reenabling_schedule_replaces_entries() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), "exit 0");

        coordinator
            .enable_schedule("0 0 3 * * *", "0 0 4 * * *")
            .unwrap();
        coordinator
            .enable_schedule("0 30 3 * * *", "0 30 4 * * *")
            .unwrap();
        assert_eq!(coordinator.scheduled_job_count(), 2);

        coordinator.disable_schedule();
        assert_eq!(coordinator.scheduled_job_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_ledger_and_engine() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), "exit 0");

        coordinator.shutdown(Duration::from_secs(1)).await;

        assert!(matches!(
            coordinator.ledger().set_unused_blobs(1),
            Err(AppError::StorageClosed)
        ));
        assert!(matches!(
            coordinator.get_garbage().await,
            Err(AppError::CollectorBusy)
        ));
    }
}
