//! Job Queue
//!
//! Tracks operator-requested tests that an agent executes. Items start
//! `pending`, can be claimed once (`running`), and end in exactly one
//! terminal state. Every transition is a compare-and-set in the store, so
//! concurrent claimants and the expiry sweep never both win.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use vigil_core::{
    AgentId, Clock, NewQueueItem, QueueFilter, QueueItem, QueueItemId, QueueStatus,
    QueueTransition, Result, Store, SystemClock, VigilError,
};

const ENTITY: &str = "queue item";

/// Item counts per status, for operational reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub expired: u64,
}

impl QueueCounts {
    fn add(&mut self, status: QueueStatus, count: u64) {
        let slot = match status {
            QueueStatus::Pending => &mut self.pending,
            QueueStatus::Running => &mut self.running,
            QueueStatus::Completed => &mut self.completed,
            QueueStatus::Failed => &mut self.failed,
            QueueStatus::Cancelled => &mut self.cancelled,
            QueueStatus::Expired => &mut self.expired,
        };
        *slot += count;
    }
}

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Inserts a new `pending` item expiring a fixed interval from now.
    #[instrument(skip(self, request), fields(agent_id = ?request.agent_id))]
    pub async fn create(&self, request: NewQueueItem) -> Result<QueueItem> {
        let item = request.into_item(self.clock.now())?;
        self.store.insert_queue_item(&item).await?;
        info!(item_id = %item.id, expires_at = %item.expires_at, "Queued on-demand test");
        Ok(item)
    }

    /// The agent's work queue: unexpired `pending` items, oldest first.
    pub async fn list_pending_for_agent(&self, agent_id: AgentId) -> Result<Vec<QueueItem>> {
        self.store
            .list_pending_queue_items(agent_id, self.clock.now())
            .await
    }

    /// Items in any state, newest first, capped by the filter's limit.
    pub async fn list_for_agent(
        &self,
        agent_id: AgentId,
        filter: QueueFilter,
    ) -> Result<Vec<QueueItem>> {
        self.store.list_queue_items(agent_id, &filter).await
    }

    pub async fn get(&self, id: QueueItemId) -> Result<QueueItem> {
        self.store
            .get_queue_item(id)
            .await?
            .ok_or_else(|| VigilError::not_found(ENTITY, id))
    }

    /// Claims a `pending` item. Fails with not-found if it was already
    /// claimed, expired, cancelled or deleted.
    pub async fn mark_running(&self, id: QueueItemId) -> Result<()> {
        self.transition(id, QueueTransition::Start { at: self.clock.now() })
            .await
    }

    pub async fn mark_completed(&self, id: QueueItemId) -> Result<()> {
        self.transition(id, QueueTransition::Complete { at: self.clock.now() })
            .await
    }

    pub async fn mark_failed(&self, id: QueueItemId, message: impl Into<String>) -> Result<()> {
        let transition = QueueTransition::Fail {
            at: self.clock.now(),
            message: message.into(),
        };
        self.transition(id, transition).await
    }

    pub async fn cancel_queue_item(&self, id: QueueItemId) -> Result<()> {
        self.transition(id, QueueTransition::Cancel { at: self.clock.now() })
            .await
    }

    /// Expires every `pending` item whose deadline has passed. Claimed and
    /// finished items are never touched.
    #[instrument(skip(self))]
    pub async fn expire_pending_items(&self) -> Result<u64> {
        let expired = self
            .store
            .expire_pending_queue_items(self.clock.now())
            .await?;
        if expired > 0 {
            info!(expired, "Expired unclaimed queue items");
        }
        Ok(expired)
    }

    pub async fn delete_queue_item(&self, id: QueueItemId) -> Result<()> {
        if self.store.delete_queue_item(id).await? {
            info!(item_id = %id, "Deleted queue item");
            Ok(())
        } else {
            Err(VigilError::not_found(ENTITY, id))
        }
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let mut counts = QueueCounts::default();
        for (status, count) in self.store.count_queue_items_by_status().await? {
            counts.add(status, count);
        }
        Ok(counts)
    }

    #[instrument(skip(self, transition), fields(item_id = %id, to = %transition.target()))]
    async fn transition(&self, id: QueueItemId, transition: QueueTransition) -> Result<()> {
        let applied = self
            .store
            .transition_queue_item(id, transition.allowed_from(), &transition)
            .await?;
        if !applied {
            debug!("Precondition not met");
            return Err(VigilError::not_found(ENTITY, id));
        }
        info!("Queue item transitioned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;
    use vigil_core::{ManualClock, MemoryStore, QUEUE_ITEM_TTL};

    fn queue() -> (JobQueue, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        (JobQueue::with_clock(store, Arc::new(clock.clone())), clock)
    }

    fn request(agent_id: AgentId) -> NewQueueItem {
        NewQueueItem::new(Uuid::new_v4(), agent_id, Uuid::new_v4())
    }

    #[tokio::test]
    async fn create_sets_pending_and_fixed_expiry() {
        let (queue, clock) = queue();
        let t0 = clock.now();

        let item = queue.create(request(Uuid::new_v4())).await.unwrap();

        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.requested_at, t0);
        assert_eq!(item.expires_at, t0 + Duration::minutes(15));
        assert_eq!(item.expires_at - item.requested_at, QUEUE_ITEM_TTL);
    }

    #[tokio::test]
    async fn create_requires_workspace_and_agent() {
        let (queue, _) = queue();
        let mut missing_agent = request(Uuid::new_v4());
        missing_agent.agent_id = None;

        let err = queue.create(missing_agent).await.unwrap_err();
        assert!(matches!(err, VigilError::BadInput { .. }));

        let mut missing_workspace = request(Uuid::new_v4());
        missing_workspace.workspace_id = None;
        assert!(queue.create(missing_workspace).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_claims_have_one_winner() {
        let (queue, _) = queue();
        let item = queue.create(request(Uuid::new_v4())).await.unwrap();

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.mark_running(item.id).await }
        });
        let second = tokio::spawn({
            let queue = queue.clone();
            async move { queue.mark_running(item.id).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
        assert!(loser.is_not_found());
        assert_eq!(queue.get(item.id).await.unwrap().status, QueueStatus::Running);
    }

    #[tokio::test]
    async fn expired_item_cannot_be_claimed() {
        let (queue, clock) = queue();
        let agent = Uuid::new_v4();
        let item = queue.create(request(agent)).await.unwrap();

        clock.advance(Duration::minutes(16));
        assert_eq!(queue.expire_pending_items().await.unwrap(), 1);
        assert_eq!(queue.get(item.id).await.unwrap().status, QueueStatus::Expired);

        let err = queue.mark_running(item.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(queue.list_pending_for_agent(agent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiry_leaves_claimed_and_finished_items_alone() {
        let (queue, clock) = queue();
        let agent = Uuid::new_v4();
        let running = queue.create(request(agent)).await.unwrap();
        let completed = queue.create(request(agent)).await.unwrap();
        let cancelled = queue.create(request(agent)).await.unwrap();
        queue.mark_running(running.id).await.unwrap();
        queue.mark_completed(completed.id).await.unwrap();
        queue.cancel_queue_item(cancelled.id).await.unwrap();

        clock.advance(Duration::hours(2));
        assert_eq!(queue.expire_pending_items().await.unwrap(), 0);

        assert_eq!(queue.get(running.id).await.unwrap().status, QueueStatus::Running);
        assert_eq!(queue.get(completed.id).await.unwrap().status, QueueStatus::Completed);
        assert_eq!(queue.get(cancelled.id).await.unwrap().status, QueueStatus::Cancelled);
    }

    #[tokio::test]
    async fn running_item_can_fail_with_message() {
        let (queue, _) = queue();
        let item = queue.create(request(Uuid::new_v4())).await.unwrap();
        queue.mark_running(item.id).await.unwrap();

        queue.mark_failed(item.id, "server unreachable").await.unwrap();

        let failed = queue.get(item.id).await.unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("server unreachable"));
        assert!(failed.completed_at.is_some());
        assert!(queue.mark_completed(item.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn cancel_only_from_pending() {
        let (queue, _) = queue();
        let item = queue.create(request(Uuid::new_v4())).await.unwrap();
        assert_ok!(queue.mark_running(item.id).await);

        let err = assert_err!(queue.cancel_queue_item(item.id).await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn pending_list_is_oldest_first_and_history_newest_first() {
        let (queue, clock) = queue();
        let agent = Uuid::new_v4();
        let first = queue.create(request(agent)).await.unwrap();
        clock.advance(Duration::seconds(30));
        let second = queue.create(request(agent)).await.unwrap();

        let pending = queue.list_pending_for_agent(agent).await.unwrap();
        assert_eq!(pending.iter().map(|i| i.id).collect::<Vec<_>>(), [first.id, second.id]);

        queue.mark_running(first.id).await.unwrap();
        let running_only = queue
            .list_for_agent(
                agent,
                QueueFilter {
                    status: Some(QueueStatus::Running),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(running_only.len(), 1);

        let history = queue
            .list_for_agent(agent, QueueFilter::default())
            .await
            .unwrap();
        assert_eq!(history[0].id, second.id);
    }

    #[tokio::test]
    async fn delete_is_unconditional_but_not_repeatable() {
        let (queue, _) = queue();
        let item = queue.create(request(Uuid::new_v4())).await.unwrap();
        queue.mark_completed(item.id).await.unwrap();

        assert_ok!(queue.delete_queue_item(item.id).await);
        assert!(assert_err!(queue.delete_queue_item(item.id).await).is_not_found());
        assert!(queue.get(item.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn counts_group_by_status() {
        let (queue, _) = queue();
        let agent = Uuid::new_v4();
        let a = queue.create(request(agent)).await.unwrap();
        queue.create(request(agent)).await.unwrap();
        queue.mark_running(a.id).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.completed, 0);
    }
}
