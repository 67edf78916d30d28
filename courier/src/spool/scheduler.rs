use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use uuid::Uuid;

use super::entry::{BounceEntry, CycleSummary, SpoolEntry};
use super::manager::SpoolManager;
use super::traits::EntryStore;
use crate::error::SpoolError;

/// Observers for finished spool cycles. They cannot affect later cycles.
pub trait SpoolHooks: Send + Sync + 'static {
    fn on_success(&self, summary: &CycleSummary) {
        if summary.failures > 0 {
            tracing::warn!(
                processed = summary.processed,
                failures = summary.failures,
                diagnostics = ?summary.diagnostics,
                "spool cycle finished with bounces"
            );
        } else if summary.processed > 0 {
            tracing::info!(processed = summary.processed, "spool cycle finished");
        }
    }

    fn on_failure(&self, error: &SpoolError) {
        tracing::error!(error = %error, "spool cycle failed");
    }
}

/// Hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHooks;

impl SpoolHooks for LogHooks {}

/// Runs [`SpoolManager::run_cycle`] on a fixed interval.
///
/// A tick that fires while the previous cycle is still running is skipped, so
/// cycles never overlap.
///
/// ```ignore
/// let mut scheduler = SpoolScheduler::new().await?;
/// scheduler.every(settings.spool_interval(), manager, Arc::new(LogHooks)).await?;
/// scheduler.start().await?;
/// ```
pub struct SpoolScheduler {
    inner: JobScheduler,
}

impl SpoolScheduler {
    pub async fn new() -> Result<Self, SpoolError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner })
    }

    /// Register the cycle for `manager` at `interval`.
    pub async fn every<S, B, H>(
        &mut self,
        interval: Duration,
        manager: Arc<SpoolManager<S, B>>,
        hooks: Arc<H>,
    ) -> Result<Uuid, SpoolError>
    where
        S: EntryStore<SpoolEntry>,
        B: EntryStore<BounceEntry>,
        H: SpoolHooks,
    {
        let running = Arc::new(Mutex::new(()));

        let job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let manager = manager.clone();
            let hooks = hooks.clone();
            let running = running.clone();
            Box::pin(async move {
                let Ok(_guard) = running.try_lock() else {
                    tracing::debug!("previous spool cycle still running, skipping tick");
                    return;
                };
                match manager.run_cycle().await {
                    Ok(summary) => hooks.on_success(&summary),
                    Err(e) => hooks.on_failure(&e),
                }
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(%id, interval_secs = interval.as_secs_f64(), "spool cycle scheduled");
        Ok(id)
    }

    pub async fn start(&self) -> Result<(), SpoolError> {
        self.inner.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SpoolError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
