use std::sync::atomic::AtomicBool;

use chrono::Utc;

use crate::{
    checkpoint::CheckpointStore,
    descriptor::{
        ResourceDescriptor,
        ResourceName,
    },
    fetcher::PageFetcher,
    normalize::Normalizer,
    scheduler::{
        run_resource,
        Mode,
        WindowSchedulerResult,
    },
    upserter::Upserter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Resources that completed without error, in run order.
    pub succeeded: Vec<ResourceName>,
    /// Resources that errored, with the error rendered to a string (the
    /// coordinator does not keep the run alive long enough to need the
    /// original error type once it has been logged).
    pub failed: Vec<(ResourceName, String)>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Component G: orchestrates per-resource runs in sequence, consulting and
/// updating the checkpoint store, applying the fail-fast/continue error
/// policy (spec.md §4.G).
pub struct SyncCoordinator<'a> {
    pub checkpoint_store: &'a dyn CheckpointStore,
    pub fetcher: &'a dyn PageFetcher,
    pub normalizer: &'a dyn Normalizer,
    pub upserter: &'a dyn Upserter,
    pub batch_size: u32,
    pub fail_fast: bool,
}

impl<'a> SyncCoordinator<'a> {
    pub async fn run(
        &self,
        descriptors: &[ResourceDescriptor],
        mode: SyncMode,
        cancelled: &AtomicBool,
    ) -> anyhow::Result<RunReport> {
        let mut report = RunReport::default();

        for descriptor in descriptors {
            if cancelled.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }

            match self.run_one(descriptor, mode, cancelled).await {
                Ok(()) => report.succeeded.push(descriptor.name),
                Err(e) => {
                    tracing::error!(resource = %descriptor.name, error = %e, "resource sync failed");
                    report.failed.push((descriptor.name, e.to_string()));
                    if self.fail_fast {
                        return Ok(report);
                    }
                },
            }
        }

        Ok(report)
    }

    async fn run_one(&self, descriptor: &ResourceDescriptor, mode: SyncMode, cancelled: &AtomicBool) -> anyhow::Result<()> {
        let checkpoint = self.checkpoint_store.get(descriptor.name.checkpoint_key()).await?;

        let scheduler_mode = match mode {
            SyncMode::Full => Mode::Full,
            SyncMode::Incremental => Mode::Incremental { checkpoint },
        };

        let result: WindowSchedulerResult = run_resource(
            descriptor,
            scheduler_mode,
            Utc::now(),
            self.fetcher,
            self.normalizer,
            self.upserter,
            self.batch_size,
            cancelled,
        )
        .await?;

        tracing::info!(
            resource = %descriptor.name,
            fetched = result.fetched,
            unique = result.unique,
            upserted = result.upserted,
            cancelled = result.cancelled,
            "resource sync finished"
        );

        if result.cancelled {
            return Ok(());
        }

        if let Some(latest_ts) = result.latest_ts {
            if let Err(e) = self
                .checkpoint_store
                .set(descriptor.name.checkpoint_key(), Some(latest_ts))
                .await
            {
                // Checkpoint write failures are logged and swallowed: the
                // data is already persisted, so a lost checkpoint only
                // causes the next run to reprocess some records, which is
                // idempotent (spec.md §7).
                tracing::warn!(resource = %descriptor.name, error = %e, "failed to persist checkpoint");
            }
        }

        Ok(())
    }
}
