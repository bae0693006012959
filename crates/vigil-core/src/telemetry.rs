//! Append-only probe result rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::submission::{ProbeId, ProbeKind, ProbeSubmission};

/// Raw telemetry tables subject to the retention window.
pub const RAW_TELEMETRY_TABLES: &[&str] = &["probe_results"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResultRecord {
    pub kind: ProbeKind,
    pub probe_id: ProbeId,
    pub agent_id: AgentId,
    pub submitting_agent_id: AgentId,
    pub target: Option<String>,
    pub triggered: bool,
    pub observed_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ProbeResultRecord {
    /// A row for `submission` under its effective kind. Duplicate rows from
    /// retried submissions are tolerated by readers.
    pub fn from_submission(
        submission: &ProbeSubmission,
        observed_at: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: submission.effective_kind().clone(),
            probe_id: submission.probe_id,
            agent_id: submission.original_agent_id,
            submitting_agent_id: submission.submitting_agent_id,
            target: submission.addressed_value().map(str::to_string),
            triggered: submission.triggered,
            observed_at,
            data,
        }
    }
}
