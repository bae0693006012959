//! Agent types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = Uuid;
pub type WorkspaceId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    /// Registered but never reported.
    Unknown,
}

/// The slice of an agent row this subsystem reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: AgentId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Set when an offline alert fired; cleared implicitly by a newer `last_seen_at`.
    pub offline_alerted_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            name: name.into(),
            last_seen_at: None,
            offline_alerted_at: None,
            deleted_at: None,
        }
    }

    pub fn status(&self, now: DateTime<Utc>, offline_after: Duration) -> AgentStatus {
        match self.last_seen_at {
            None => AgentStatus::Unknown,
            Some(seen) if now - seen > offline_after => AgentStatus::Offline,
            Some(_) => AgentStatus::Online,
        }
    }

    /// Offline, and no alert has been raised since the agent was last seen.
    pub fn needs_offline_alert(&self, now: DateTime<Utc>, offline_after: Duration) -> bool {
        if self.deleted_at.is_some() || self.status(now, offline_after) != AgentStatus::Offline {
            return false;
        }
        match (self.offline_alerted_at, self.last_seen_at) {
            (Some(alerted), Some(seen)) => alerted < seen,
            _ => true,
        }
    }
}
