//! The durable-store contract
//!
//! Everything that mutates shared state goes through [`Store`]. Cross-caller
//! safety (one claimant per queue item, sweeps racing claims) rests entirely on
//! [`Store::transition_queue_item`] being an atomic compare-and-set: the row
//! changes only if its current status is one of the expected ones.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentRecord};
use crate::error::Result;
use crate::queue::{QueueFilter, QueueItem, QueueItemId, QueueStatus, QueueTransition};
use crate::server::CachedServer;
use crate::telemetry::ProbeResultRecord;

/// Entity kinds that are soft-deleted first and hard-deleted by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcEntity {
    Agents,
    Probes,
    ProbeTargets,
    AgentPins,
}

impl GcEntity {
    pub const ALL: [GcEntity; 4] = [
        GcEntity::Agents,
        GcEntity::Probes,
        GcEntity::ProbeTargets,
        GcEntity::AgentPins,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::Probes => "probes",
            Self::ProbeTargets => "probe_targets",
            Self::AgentPins => "agent_pins",
        }
    }
}

impl fmt::Display for GcEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()>;

    async fn get_queue_item(&self, id: QueueItemId) -> Result<Option<QueueItem>>;

    /// Pending items with `expires_at > now`, oldest request first.
    async fn list_pending_queue_items(
        &self,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>>;

    /// Items for one agent, newest request first.
    async fn list_queue_items(
        &self,
        agent_id: AgentId,
        filter: &QueueFilter,
    ) -> Result<Vec<QueueItem>>;

    /// Applies `transition` only if the item's current status is in
    /// `expected`. Returns whether exactly one row changed.
    async fn transition_queue_item(
        &self,
        id: QueueItemId,
        expected: &[QueueStatus],
        transition: &QueueTransition,
    ) -> Result<bool>;

    /// Moves every pending item with `expires_at <= now` to expired.
    async fn expire_pending_queue_items(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn delete_queue_item(&self, id: QueueItemId) -> Result<bool>;

    /// Removes terminal items that finished before `before`.
    async fn purge_finished_queue_items(&self, before: DateTime<Utc>) -> Result<u64>;

    async fn count_queue_items_by_status(&self) -> Result<Vec<(QueueStatus, u64)>>;

    /// Insert-or-update keyed by `(agent, server_id)`. Never deletes.
    async fn upsert_servers_for_agent(
        &self,
        agent_id: AgentId,
        servers: &[CachedServer],
    ) -> Result<()>;

    async fn list_servers_for_agent(&self, agent_id: AgentId) -> Result<Vec<CachedServer>>;

    async fn append_probe_result(&self, record: &ProbeResultRecord) -> Result<()>;

    /// Installs a time-based expiration policy on a raw telemetry table.
    async fn apply_retention_policy(&self, table: &str, window: Duration) -> Result<()>;

    async fn upsert_agent(&self, agent: &AgentRecord) -> Result<()>;

    async fn get_agent(&self, agent_id: AgentId) -> Result<Option<AgentRecord>>;

    /// Moves `last_seen_at` forward to `at`; older timestamps are ignored.
    /// Returns whether the row changed.
    async fn touch_agent_last_seen(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<bool>;

    /// Live agents silent for longer than `threshold` that have not been
    /// alerted since they were last seen.
    async fn list_agents_needing_offline_alert(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<AgentRecord>>;

    async fn mark_agent_offline_alerted(&self, agent_id: AgentId, at: DateTime<Utc>)
        -> Result<bool>;

    /// Hard-deletes rows of `entity` whose soft-delete marker is older than
    /// `cutoff`.
    async fn purge_soft_deleted(&self, entity: GcEntity, cutoff: DateTime<Utc>) -> Result<u64>;
}
