//! The cleanup and alert tasks, started and stopped together

use std::sync::Arc;

use job_queue::JobQueue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::{Clock, PolicyConfig, Store};

use crate::alerts::{AlertEvaluator, AlertPass};
use crate::cleanup::CleanupSweep;
use crate::periodic::PeriodicTask;

pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.iter().map(|(n, _)| *n).collect::<Vec<_>>())
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Scheduler {
    /// Starts the cleanup sweep and the alert pass, each on its own cadence.
    /// Both stop when `shutdown` is cancelled.
    pub fn spawn(
        store: Arc<dyn Store>,
        evaluator: Arc<dyn AlertEvaluator>,
        clock: Arc<dyn Clock>,
        policy: &PolicyConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let queue = JobQueue::with_clock(store.clone(), clock.clone());
        let cleanup = CleanupSweep::new(store, queue, clock.clone(), policy.retention);
        let alerts = AlertPass::new(evaluator, clock);

        Self::spawn_tasks(
            vec![
                PeriodicTask::new(
                    "cleanup",
                    policy.retention.cleanup_interval(),
                    Arc::new(cleanup),
                ),
                PeriodicTask::new(
                    "offline-alerts",
                    policy.alerts.check_interval(),
                    Arc::new(alerts),
                ),
            ],
            shutdown,
        )
    }

    pub fn spawn_tasks(tasks: Vec<PeriodicTask>, shutdown: CancellationToken) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|task| {
                let name = task.name();
                (name, task.spawn(shutdown.child_token()))
            })
            .collect::<Vec<_>>();
        info!(count = tasks.len(), "Scheduler started");
        Self { shutdown, tasks }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels every task and waits for in-flight passes to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, "Task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{LogAlertSink, OfflineAgentEvaluator};
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use vigil_core::{AgentRecord, GcEntity, ManualClock, MemoryStore};

    #[tokio::test(start_paused = true)]
    async fn first_passes_run_on_spawn_and_stop_on_shutdown() {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        store.insert_gc_row(
            GcEntity::Probes,
            Uuid::new_v4(),
            Some(clock.now() - Duration::days(31)),
        );
        let mut agent = AgentRecord::new(Uuid::new_v4(), "edge-paris");
        agent.last_seen_at = Some(clock.now() - Duration::hours(1));
        store.upsert_agent(&agent).await.unwrap();

        let evaluator = Arc::new(OfflineAgentEvaluator::new(
            store.clone(),
            Arc::new(LogAlertSink),
            Duration::minutes(5),
        ));
        let scheduler = Scheduler::spawn(
            store.clone(),
            evaluator,
            Arc::new(clock.clone()),
            &PolicyConfig::default(),
            CancellationToken::new(),
        );

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        scheduler.shutdown().await;

        assert_eq!(store.gc_row_count(GcEntity::Probes), 0);
        let stored = store.get_agent(agent.id).await.unwrap().unwrap();
        assert!(stored.offline_alerted_at.is_some());
    }
}
