use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use vigil_core::{
    AgentId, AgentRecord, CachedServer, GcEntity, MemoryStore, ProbeResultRecord, QueueFilter,
    QueueItem, QueueItemId, QueueStatus, QueueTransition, Result, Store, VigilError,
};

/// Delegates to a memory store but fails purges of one entity kind and
/// alert marks for one agent.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub broken_entity: Option<GcEntity>,
    pub broken_agent: Option<AgentId>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            broken_entity: None,
            broken_agent: None,
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()> {
        self.inner.insert_queue_item(item).await
    }
    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        self.inner.get_queue_item(id).await
    }
    async fn list_pending_queue_items(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        self.inner.list_pending_queue_items(agent_id, now).await
    }
    async fn list_queue_items(&self, agent_id: AgentId, filter: &QueueFilter) -> Result<Vec<QueueItem>> {
        self.inner.list_queue_items(agent_id, filter).await
    }
    async fn transition_queue_item(
        &self,
        id: QueueItemId,
        expected: &[QueueStatus],
        transition: &QueueTransition,
    ) -> Result<bool> {
        self.inner.transition_queue_item(id, expected, transition).await
    }
    async fn expire_pending_queue_items(&self, now: DateTime<Utc>) -> Result<u64> {
        self.inner.expire_pending_queue_items(now).await
    }
    async fn delete_queue_item(&self, id: QueueItemId) -> Result<bool> {
        self.inner.delete_queue_item(id).await
    }
    async fn purge_finished_queue_items(&self, before: DateTime<Utc>) -> Result<u64> {
        self.inner.purge_finished_queue_items(before).await
    }
    async fn count_queue_items_by_status(&self) -> Result<Vec<(QueueStatus, u64)>> {
        self.inner.count_queue_items_by_status().await
    }
    async fn upsert_servers_for_agent(&self, agent_id: AgentId, servers: &[CachedServer]) -> Result<()> {
        self.inner.upsert_servers_for_agent(agent_id, servers).await
    }
    async fn list_servers_for_agent(&self, agent_id: AgentId) -> Result<Vec<CachedServer>> {
        self.inner.list_servers_for_agent(agent_id).await
    }
    async fn append_probe_result(&self, record: &ProbeResultRecord) -> Result<()> {
        self.inner.append_probe_result(record).await
    }
    async fn apply_retention_policy(&self, table: &str, window: Duration) -> Result<()> {
        self.inner.apply_retention_policy(table, window).await
    }
    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.inner.upsert_agent(agent).await
    }
    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<AgentRecord>> {
        self.inner.get_agent(agent_id).await
    }
    async fn touch_agent_last_seen(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<bool> {
        self.inner.touch_agent_last_seen(agent_id, at).await
    }
    async fn list_agents_needing_offline_alert(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<AgentRecord>> {
        self.inner.list_agents_needing_offline_alert(now, threshold).await
    }
    async fn mark_agent_offline_alerted(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<bool> {
        if self.broken_agent == Some(agent_id) {
            return Err(VigilError::store("row locked"));
        }
        self.inner.mark_agent_offline_alerted(agent_id, at).await
    }
    async fn purge_soft_deleted(&self, entity: GcEntity, cutoff: DateTime<Utc>) -> Result<u64> {
        if self.broken_entity == Some(entity) {
            return Err(VigilError::store("relation is locked"));
        }
        self.inner.purge_soft_deleted(entity, cutoff).await
    }
}
