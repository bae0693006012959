//! In-process [`Store`] backed by concurrent maps.
//!
//! Each conditional update runs while holding the entry's shard lock, which
//! gives the same compare-and-set guarantee a guarded `UPDATE` gives in SQL.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{GcEntity, Store};
use crate::agent::{AgentId, AgentRecord};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::queue::{QueueFilter, QueueItem, QueueItemId, QueueStatus, QueueTransition};
use crate::server::CachedServer;
use crate::telemetry::ProbeResultRecord;

const PROBE_RESULTS_TABLE: &str = "probe_results";

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    queue: DashMap<QueueItemId, QueueItem>,
    servers: DashMap<(AgentId, String), CachedServer>,
    agents: DashMap<AgentId, AgentRecord>,
    /// Soft-deletable rows other than agents, keyed by kind and id.
    gc_rows: DashMap<(GcEntity, Uuid), Option<DateTime<Utc>>>,
    results: RwLock<Vec<ProbeResultRecord>>,
    retention: Mutex<HashMap<String, Duration>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("queue_items", &self.queue.len())
            .field("cached_servers", &self.servers.len())
            .field("agents", &self.agents.len())
            .field("probe_results", &self.results.read().len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queue: DashMap::new(),
            servers: DashMap::new(),
            agents: DashMap::new(),
            gc_rows: DashMap::new(),
            results: RwLock::new(Vec::new()),
            retention: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a row of a garbage-collectable kind, optionally already
    /// soft-deleted. Agents are stored as full records instead.
    pub fn insert_gc_row(&self, entity: GcEntity, id: Uuid, deleted_at: Option<DateTime<Utc>>) {
        if entity == GcEntity::Agents {
            let mut agent = AgentRecord::new(Uuid::nil(), id.to_string());
            agent.id = id;
            agent.deleted_at = deleted_at;
            self.agents.insert(id, agent);
        } else {
            self.gc_rows.insert((entity, id), deleted_at);
        }
    }

    pub fn gc_row_count(&self, entity: GcEntity) -> usize {
        match entity {
            GcEntity::Agents => self.agents.len(),
            _ => self.gc_rows.iter().filter(|e| e.key().0 == entity).count(),
        }
    }

    pub fn probe_results(&self) -> Vec<ProbeResultRecord> {
        self.results.read().clone()
    }

    pub fn retention_window(&self, table: &str) -> Option<Duration> {
        self.retention.lock().get(table).copied()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()> {
        self.queue.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        Ok(self.queue.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_pending_queue_items(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .queue
            .iter()
            .filter(|e| {
                e.agent_id == agent_id && e.status == QueueStatus::Pending && e.expires_at > now
            })
            .map(|e| e.value().clone())
            .collect();
        items.sort_by_key(|item| item.requested_at);
        Ok(items)
    }

    async fn list_queue_items(
        &self,
        agent_id: AgentId,
        filter: &QueueFilter,
    ) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .queue
            .iter()
            .filter(|e| e.agent_id == agent_id && filter.status.map_or(true, |s| e.status == s))
            .map(|e| e.value().clone())
            .collect();
        items.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        items.truncate(filter.effective_limit());
        Ok(items)
    }

    async fn transition_queue_item(
        &self,
        id: QueueItemId,
        expected: &[QueueStatus],
        transition: &QueueTransition,
    ) -> Result<bool> {
        let Some(mut entry) = self.queue.get_mut(&id) else {
            return Ok(false);
        };
        if !expected.contains(&entry.status) {
            debug!(item_id = %id, status = %entry.status, "conditional transition skipped");
            return Ok(false);
        }
        entry.apply(transition);
        Ok(true)
    }

    async fn expire_pending_queue_items(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for mut entry in self.queue.iter_mut() {
            if entry.status == QueueStatus::Pending && entry.is_expired_at(now) {
                entry.apply(&QueueTransition::Expire);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn delete_queue_item(&self, id: QueueItemId) -> Result<bool> {
        Ok(self.queue.remove(&id).is_some())
    }

    async fn purge_finished_queue_items(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut purged = 0;
        self.queue.retain(|_, item| {
            let finished = match item.status {
                QueueStatus::Expired => item.expires_at < before,
                status if status.is_terminal() => item.completed_at.is_some_and(|at| at < before),
                _ => false,
            };
            if finished {
                purged += 1;
            }
            !finished
        });
        Ok(purged)
    }

    async fn count_queue_items_by_status(&self) -> Result<Vec<(QueueStatus, u64)>> {
        let mut counts: HashMap<QueueStatus, u64> = HashMap::new();
        for entry in self.queue.iter() {
            *counts.entry(entry.status).or_default() += 1;
        }
        Ok(QueueStatus::ALL
            .into_iter()
            .map(|status| (status, counts.get(&status).copied().unwrap_or(0)))
            .collect())
    }

    async fn upsert_servers_for_agent(
        &self,
        agent_id: AgentId,
        servers: &[CachedServer],
    ) -> Result<()> {
        for server in servers {
            let mut row = server.clone();
            row.agent_id = agent_id;
            self.servers.insert((agent_id, server.server_id.clone()), row);
        }
        Ok(())
    }

    async fn list_servers_for_agent(&self, agent_id: AgentId) -> Result<Vec<CachedServer>> {
        let mut servers: Vec<CachedServer> = self
            .servers
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .map(|e| e.value().clone())
            .collect();
        servers.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        Ok(servers)
    }

    async fn append_probe_result(&self, record: &ProbeResultRecord) -> Result<()> {
        let window = self.retention_window(PROBE_RESULTS_TABLE);
        let mut results = self.results.write();
        results.push(record.clone());
        if let Some(window) = window {
            let horizon = crate::clock::horizon(self.clock.now(), window)?;
            results.retain(|row| row.observed_at >= horizon);
        }
        Ok(())
    }

    async fn apply_retention_policy(&self, table: &str, window: Duration) -> Result<()> {
        self.retention.lock().insert(table.to_string(), window);
        Ok(())
    }

    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()> {
        self.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<AgentRecord>> {
        Ok(self.agents.get(&agent_id).map(|e| e.value().clone()))
    }

    async fn touch_agent_last_seen(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<bool> {
        let Some(mut agent) = self.agents.get_mut(&agent_id) else {
            return Ok(false);
        };
        if agent.last_seen_at.is_some_and(|seen| seen >= at) {
            return Ok(false);
        }
        agent.last_seen_at = Some(at);
        Ok(true)
    }

    async fn list_agents_needing_offline_alert(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<AgentRecord>> {
        Ok(self
            .agents
            .iter()
            .filter(|e| e.needs_offline_alert(now, threshold))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn mark_agent_offline_alerted(
        &self,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut agent) = self.agents.get_mut(&agent_id) else {
            return Ok(false);
        };
        agent.offline_alerted_at = Some(at);
        Ok(true)
    }

    async fn purge_soft_deleted(&self, entity: GcEntity, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut purged = 0;
        let expired = |deleted_at: Option<DateTime<Utc>>| deleted_at.is_some_and(|at| at < cutoff);
        match entity {
            GcEntity::Agents => self.agents.retain(|_, agent| {
                let stale = expired(agent.deleted_at);
                purged += u64::from(stale);
                !stale
            }),
            _ => self.gc_rows.retain(|(kind, _), deleted_at| {
                let stale = *kind == entity && expired(*deleted_at);
                purged += u64::from(stale);
                !stale
            }),
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::queue::NewQueueItem;

    fn item(agent: AgentId, at: DateTime<Utc>) -> QueueItem {
        NewQueueItem::new(Uuid::new_v4(), agent, Uuid::new_v4())
            .into_item(at)
            .unwrap()
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let queued = item(Uuid::new_v4(), now);
        store.insert_queue_item(&queued).await.unwrap();

        let start = QueueTransition::Start { at: now };
        assert!(store
            .transition_queue_item(queued.id, &[QueueStatus::Pending], &start)
            .await
            .unwrap());
        assert!(!store
            .transition_queue_item(queued.id, &[QueueStatus::Pending], &start)
            .await
            .unwrap());
        assert!(!store
            .transition_queue_item(Uuid::new_v4(), &[QueueStatus::Pending], &start)
            .await
            .unwrap());

        let stored = store.get_queue_item(queued.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Running);
        assert_eq!(stored.started_at, Some(now));
    }

    #[tokio::test]
    async fn listing_orders_and_limits() {
        let store = MemoryStore::new();
        let agent = Uuid::new_v4();
        let t0 = Utc::now();
        for minutes in 0..5 {
            store
                .insert_queue_item(&item(agent, t0 + Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        store.insert_queue_item(&item(Uuid::new_v4(), t0)).await.unwrap();

        let pending = store
            .list_pending_queue_items(agent, t0 + Duration::minutes(4))
            .await
            .unwrap();
        assert_eq!(pending.len(), 5);
        assert!(pending.windows(2).all(|w| w[0].requested_at <= w[1].requested_at));

        let newest = store
            .list_queue_items(
                agent,
                &QueueFilter {
                    status: None,
                    limit: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].requested_at, t0 + Duration::minutes(4));
    }

    #[tokio::test]
    async fn last_seen_only_moves_forward() {
        let store = MemoryStore::new();
        let agent = AgentRecord::new(Uuid::new_v4(), "probe-host");
        store.upsert_agent(&agent).await.unwrap();
        let t0 = Utc::now();

        assert!(store.touch_agent_last_seen(agent.id, t0).await.unwrap());
        assert!(!store
            .touch_agent_last_seen(agent.id, t0 - Duration::seconds(30))
            .await
            .unwrap());
        assert!(!store.touch_agent_last_seen(agent.id, t0).await.unwrap());

        let stored = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_at, Some(t0));
    }

    #[tokio::test]
    async fn retention_window_prunes_old_rows() {
        let clock = ManualClock::default();
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        store
            .apply_retention_policy("probe_results", Duration::days(1))
            .await
            .unwrap();

        let record = |observed_at| ProbeResultRecord {
            kind: crate::ProbeKind::PING,
            probe_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            submitting_agent_id: Uuid::new_v4(),
            target: None,
            triggered: false,
            observed_at,
            data: serde_json::Value::Null,
        };
        store
            .append_probe_result(&record(clock.now() - Duration::days(2)))
            .await
            .unwrap();
        store.append_probe_result(&record(clock.now())).await.unwrap();

        assert_eq!(store.probe_results().len(), 1);
    }
}
