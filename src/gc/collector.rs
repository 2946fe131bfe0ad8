use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::output::{self, DryRunReport};
use crate::error::AppError;

const REGISTRY_BIN: &str = "/bin/registry";
const GC_COMMAND: &str = "garbage-collect";
const DELETE_UNTAGGED: &str = "--delete-untagged";
const DRY_RUN: &str = "--dry-run";

/// Executes the external collection command against the registry, at most one
/// invocation in flight at any instant.
///
/// The single-permit semaphore is the execution slot: it is acquired before
/// any docker command is issued and, on the removal path, travels into the
/// detached swap-back task so the slot stays held until the registry is back
/// on its mutable container — well after the caller has already returned.
#[derive(Clone)]
pub struct GarbageCollector {
    container: String,
    ro_container: String,
    registry_config: String,
    docker_bin: PathBuf,
    slot: Arc<Semaphore>,
}

impl GarbageCollector {
    pub fn new(
        container: impl Into<String>,
        ro_container: impl Into<String>,
        registry_config: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            ro_container: ro_container.into(),
            registry_config: registry_config.into(),
            docker_bin: PathBuf::from("docker"),
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Overrides the docker binary, for stubbing in tests.
    pub fn with_docker_bin(mut self, docker_bin: impl Into<PathBuf>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    /// Non-blocking acquire: fails fast with `CollectorBusy` when a run is in
    /// flight. Used by the HTTP surface.
    pub async fn try_list_garbage(&self) -> Result<Vec<String>, AppError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::CollectorBusy)?;
        self.list_garbage_locked(permit).await
    }

    /// Blocking acquire: waits until the slot is free. Used by the scheduler,
    /// which should wait out a concurrent run rather than skip its tick.
    pub async fn list_garbage(&self) -> Result<Vec<String>, AppError> {
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::CollectorBusy)?;
        self.list_garbage_locked(permit).await
    }

    async fn list_garbage_locked(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<Vec<String>, AppError> {
        // Held for the whole run, released unconditionally on return.
        let _permit = permit;

        let output = self
            .docker([
                "exec",
                &self.container,
                REGISTRY_BIN,
                GC_COMMAND,
                DELETE_UNTAGGED,
                DRY_RUN,
                &self.registry_config,
            ])
            .await?;
        if !output.status.success() {
            return Err(AppError::CollectorExecutionFailed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let DryRunReport { blobs, stats } =
            output::parse_dry_run(&String::from_utf8_lossy(&output.stdout));
        for line in stats {
            tracing::info!(stats = %line, "garbage collector dry run results");
        }
        Ok(blobs)
    }

    pub async fn try_remove_garbage(&self) -> Result<(), AppError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::CollectorBusy)?;
        self.remove_garbage_locked(permit).await
    }

    pub async fn remove_garbage(&self) -> Result<(), AppError> {
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::CollectorBusy)?;
        self.remove_garbage_locked(permit).await
    }

    /// Two-phase removal: swap the registry onto its read-only standby, run
    /// the destructive collection there, then swap back in a detached task.
    ///
    /// The caller gets an answer as soon as the collector command finishes;
    /// the swap-back (and the slot release after it) runs in the background so
    /// the response is not blocked on a second container restart. Until that
    /// tail completes every other list/remove entry point stays `Busy`.
    async fn remove_garbage_locked(&self, permit: OwnedSemaphorePermit) -> Result<(), AppError> {
        if let Err(err) = self.swap_containers(true).await {
            drop(permit);
            return Err(err);
        }

        let result = self
            .docker([
                "exec",
                &self.ro_container,
                REGISTRY_BIN,
                GC_COMMAND,
                DELETE_UNTAGGED,
                &self.registry_config,
            ])
            .await;

        // Swap-back tail: fire-and-forget regardless of the collector's
        // outcome. Its failures are logged, never surfaced to the caller.
        let tail = self.clone();
        tokio::spawn(async move {
            if let Err(err) = tail.swap_containers(false).await {
                tracing::error!(error = %err, "swap-back after garbage removal failed");
            }
            drop(permit);
        });

        let output = result?;
        if !output.status.success() {
            return Err(AppError::CollectorExecutionFailed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let report = output::parse_removal(&String::from_utf8_lossy(&output.stdout));
        for line in report.log_lines {
            tracing::info!(target: "collector", "{line}");
        }
        for line in report.stats {
            tracing::info!(stats = %line, "garbage collector run results");
        }
        Ok(())
    }

    /// Stops one container and starts the other. `start_ro = true` moves the
    /// registry onto the read-only standby; `false` reverses it.
    async fn swap_containers(&self, start_ro: bool) -> Result<(), AppError> {
        let (to_start, to_stop) = if start_ro {
            (&self.ro_container, &self.container)
        } else {
            (&self.container, &self.ro_container)
        };

        tracing::info!(container = %to_stop, "stopping container");
        self.container_op("stop", to_stop).await?;
        tracing::info!(container = %to_start, "starting container");
        self.container_op("start", to_start).await?;
        Ok(())
    }

    async fn container_op(&self, action: &'static str, container: &str) -> Result<(), AppError> {
        let output = self.docker([action, container]).await?;
        if !output.status.success() {
            return Err(AppError::ContainerSwapFailed {
                action,
                container: container.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    /// Startup recovery for a crash mid-swap: the live-container state is
    /// never persisted, so probe both containers and, if the standby is the
    /// one serving traffic, move the registry back onto the mutable one.
    pub async fn reconcile_containers(&self) -> Result<(), AppError> {
        let mutable_running = self.container_running(&self.container).await?;
        let ro_running = self.container_running(&self.ro_container).await?;
        if !mutable_running && ro_running {
            tracing::warn!(
                container = %self.ro_container,
                "standby container found live at startup, swapping back"
            );
            self.swap_containers(false).await?;
        }
        Ok(())
    }

    async fn container_running(&self, container: &str) -> Result<bool, AppError> {
        let output = self
            .docker(["inspect", "-f", "{{.State.Running}}", container])
            .await?;
        if !output.status.success() {
            return Err(AppError::ContainerSwapFailed {
                action: "inspect",
                container: container.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    /// Drains the engine: waits until the slot is free (any in-flight run,
    /// including a removal's swap-back tail, has finished), then closes it so
    /// no further run can start.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), AppError> {
        match tokio::time::timeout(deadline, self.slot.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.slot.close();
                Ok(())
            }
            // Already closed by an earlier shutdown.
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                // Deadline hit with a run still in flight. Close anyway:
                // shutdown is terminal, so the straggler's release must not
                // hand the slot to a new run.
                self.slot.close();
                Err(AppError::ShutdownTimedOut)
            }
        }
    }

    async fn docker<const N: usize>(&self, args: [&str; N]) -> Result<Output, AppError> {
        Ok(Command::new(&self.docker_bin).args(args).output().await?)
    }
}
