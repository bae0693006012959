//! On-demand test requests and their lifecycle

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentId, WorkspaceId};
use crate::error::VigilError;

pub type QueueItemId = Uuid;

/// Lifetime of a pending request. Fixed by protocol, not configurable.
pub const QUEUE_ITEM_TTL: Duration = Duration::minutes(15);

/// Default page size for per-agent listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 6] = [
        QueueStatus::Pending,
        QueueStatus::Running,
        QueueStatus::Completed,
        QueueStatus::Failed,
        QueueStatus::Cancelled,
        QueueStatus::Expired,
    ];

    /// States from which a completion or failure may be recorded.
    pub const NON_TERMINAL: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Running];

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Edges of the lifecycle graph. Completion and failure may skip `running`.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| VigilError::bad_input(format!("unknown queue status '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: QueueItemId,
    pub workspace_id: WorkspaceId,
    pub agent_id: AgentId,
    pub server_id: Option<String>,
    pub server_name: Option<String>,
    pub status: QueueStatus,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl QueueItem {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Applies a transition in place. Callers must already have checked the
    /// expected source state.
    pub fn apply(&mut self, transition: &QueueTransition) {
        self.status = transition.target();
        match transition {
            QueueTransition::Start { at } => self.started_at = Some(*at),
            QueueTransition::Complete { at } | QueueTransition::Cancel { at } => {
                self.completed_at = Some(*at)
            }
            QueueTransition::Fail { at, message } => {
                self.completed_at = Some(*at);
                self.error = Some(message.clone());
            }
            QueueTransition::Expire => {}
        }
    }
}

/// Operator request for a new on-demand test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueueItem {
    pub workspace_id: Option<WorkspaceId>,
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    pub requested_by: Uuid,
}

impl NewQueueItem {
    pub fn new(workspace_id: WorkspaceId, agent_id: AgentId, requested_by: Uuid) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            agent_id: Some(agent_id),
            server_id: None,
            server_name: None,
            requested_by,
        }
    }

    pub fn with_server(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.server_id = Some(id.into());
        self.server_name = Some(name.into());
        self
    }

    /// Builds the initial `pending` item. Nil identifiers count as absent.
    pub fn into_item(self, now: DateTime<Utc>) -> crate::Result<QueueItem> {
        let workspace_id = self
            .workspace_id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| VigilError::bad_input("workspace id is required"))?;
        let agent_id = self
            .agent_id
            .filter(|id| !id.is_nil())
            .ok_or_else(|| VigilError::bad_input("agent id is required"))?;

        Ok(QueueItem {
            id: Uuid::new_v4(),
            workspace_id,
            agent_id,
            server_id: self.server_id,
            server_name: self.server_name,
            status: QueueStatus::Pending,
            requested_by: self.requested_by,
            requested_at: now,
            expires_at: now + QUEUE_ITEM_TTL,
            started_at: None,
            completed_at: None,
            error: None,
        })
    }
}

/// A state change applied by a store-level compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueTransition {
    Start { at: DateTime<Utc> },
    Complete { at: DateTime<Utc> },
    Fail { at: DateTime<Utc>, message: String },
    Cancel { at: DateTime<Utc> },
    Expire,
}

impl QueueTransition {
    pub fn target(&self) -> QueueStatus {
        match self {
            Self::Start { .. } => QueueStatus::Running,
            Self::Complete { .. } => QueueStatus::Completed,
            Self::Fail { .. } => QueueStatus::Failed,
            Self::Cancel { .. } => QueueStatus::Cancelled,
            Self::Expire => QueueStatus::Expired,
        }
    }

    /// Source states this transition is allowed from.
    pub fn allowed_from(&self) -> &'static [QueueStatus] {
        match self {
            Self::Start { .. } | Self::Cancel { .. } | Self::Expire => &[QueueStatus::Pending],
            Self::Complete { .. } | Self::Fail { .. } => &QueueStatus::NON_TERMINAL,
        }
    }
}

/// Filter for per-agent listings, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub limit: Option<usize>,
}

impl QueueFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT)
    }
}
