//! Cleanup sweep
//!
//! Hard-deletes soft-deleted rows older than the grace period, expires
//! unclaimed queue items and drops finished ones past the retention window.
//! A failing step is logged and the rest of the pass still runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use job_queue::JobQueue;
use serde::Serialize;
use tracing::{error, info, instrument};
use vigil_core::{horizon, Clock, GcEntity, Result, RetentionConfig, Store};

use crate::periodic::Pass;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub purged: Vec<(GcEntity, u64)>,
    pub failed: Vec<GcEntity>,
    pub expired_queue_items: u64,
    pub purged_queue_items: u64,
}

impl CleanupReport {
    pub fn total_purged(&self) -> u64 {
        self.purged.iter().map(|(_, count)| count).sum()
    }
}

pub struct CleanupSweep {
    store: Arc<dyn Store>,
    queue: JobQueue,
    clock: Arc<dyn Clock>,
    retention: RetentionConfig,
}

impl CleanupSweep {
    pub fn new(
        store: Arc<dyn Store>,
        queue: JobQueue,
        clock: Arc<dyn Clock>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            retention,
        }
    }

    /// Rows soft-deleted strictly before this instant are removed.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        horizon(now, self.retention.grace_period())
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self) -> CleanupReport {
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        match self.cutoff(now) {
            Ok(cutoff) => self.purge_entities(cutoff, &mut report).await,
            Err(e) => {
                error!("Skipping soft-delete purge: {}", e);
                report.failed.extend(GcEntity::ALL);
            }
        }

        match self.queue.expire_pending_items().await {
            Ok(count) => report.expired_queue_items = count,
            Err(e) => error!("Failed to expire queue items: {}", e),
        }

        let purged = match horizon(now, self.retention.retention_window()) {
            Ok(before) => self.store.purge_finished_queue_items(before).await,
            Err(e) => Err(e),
        };
        match purged {
            Ok(count) => report.purged_queue_items = count,
            Err(e) => error!("Failed to purge finished queue items: {}", e),
        }

        info!(
            purged = report.total_purged(),
            expired = report.expired_queue_items,
            finished_purged = report.purged_queue_items,
            failures = report.failed.len(),
            "Cleanup pass complete"
        );
        report
    }

    async fn purge_entities(&self, cutoff: DateTime<Utc>, report: &mut CleanupReport) {
        for entity in GcEntity::ALL {
            match self.store.purge_soft_deleted(entity, cutoff).await {
                Ok(count) => {
                    if count > 0 {
                        info!(%entity, count, "Purged soft-deleted rows");
                    }
                    report.purged.push((entity, count));
                }
                Err(e) => {
                    error!(%entity, "Failed to purge soft-deleted rows: {}", e);
                    report.failed.push(entity);
                }
            }
        }
    }
}

#[async_trait]
impl Pass for CleanupSweep {
    async fn run(&self) -> Result<()> {
        self.sweep().await;
        Ok(())
    }
}
