use std::future::Future;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;

use crate::error::AppError;

/// Runs `job` at every occurrence of `schedule` until the task is aborted.
///
/// A failed run is logged and swallowed; the next tick retries. Ticks do not
/// pile up: the next occurrence is computed after the previous run finishes.
pub fn spawn_cron_job<F, Fut>(schedule: Schedule, name: &'static str, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send,
{
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!(job = name, "cron spec has no further occurrences");
                break;
            };
            let delay = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            if let Err(err) = job().await {
                tracing::warn!(job = name, error = %err, "scheduled run failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn job_fires_on_every_tick() {
        let schedule = Schedule::from_str("* * * * * *").unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let handle = spawn_cron_job(schedule, "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(3200)).await;
        handle.abort();
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn failing_job_keeps_ticking() {
        let schedule = Schedule::from_str("* * * * * *").unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let handle = spawn_cron_job(schedule, "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::CollectorBusy)
            }
        });

        tokio::time::sleep(Duration::from_millis(3200)).await;
        handle.abort();
        assert!(ticks.load(Ordering::SeqCst) >= 2, "errors must not stop the job");
    }
}
