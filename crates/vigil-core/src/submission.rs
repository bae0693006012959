//! Probe-result submissions as produced by agents

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentId;

pub type ProbeId = Uuid;
pub type SubmissionId = Uuid;

/// Separates the packed kind from the addressed value in a relayed target,
/// e.g. `PING%%%1.2.3.4`. Wire-compatibility constant.
pub const KIND_DELIMITER: &str = "%%%";

/// Discriminator selecting the handler for a submission. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeKind(Cow<'static, str>);

impl ProbeKind {
    pub const PING: ProbeKind = ProbeKind(Cow::Borrowed("PING"));
    pub const MTR: ProbeKind = ProbeKind(Cow::Borrowed("MTR"));
    pub const SPEEDTEST: ProbeKind = ProbeKind(Cow::Borrowed("SPEEDTEST"));
    pub const SPEEDTEST_SERVERS: ProbeKind = ProbeKind(Cow::Borrowed("SPEEDTEST_SERVERS"));
    pub const NETINFO: ProbeKind = ProbeKind(Cow::Borrowed("NETINFO"));
    /// Generic relay kind; the real kind travels packed in the target.
    pub const AGENT: ProbeKind = ProbeKind(Cow::Borrowed("AGENT"));

    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_relay(&self) -> bool {
        *self == Self::AGENT
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProbeKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// A wire `target` string decoded once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Present only when the raw target carried [`KIND_DELIMITER`].
    pub effective_kind: Option<ProbeKind>,
    pub addressed_value: String,
}

impl TargetDescriptor {
    /// First occurrence of the delimiter wins; anything after it, including
    /// further delimiters, belongs to the addressed value.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(KIND_DELIMITER) {
            Some((kind, value)) => Self {
                effective_kind: Some(ProbeKind::new(kind)),
                addressed_value: value.to_string(),
            },
            None => Self {
                effective_kind: None,
                addressed_value: raw.to_string(),
            },
        }
    }

    /// Re-encodes to the wire form.
    pub fn to_wire(&self) -> String {
        match &self.effective_kind {
            Some(kind) => format!("{kind}{KIND_DELIMITER}{}", self.addressed_value),
            None => self.addressed_value.clone(),
        }
    }
}

/// An immutable, normalized probe result awaiting dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSubmission {
    pub id: SubmissionId,
    pub probe_id: ProbeId,
    pub original_agent_id: AgentId,
    pub submitting_agent_id: AgentId,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Server time at which the gateway accepted the submission.
    pub received_at: DateTime<Utc>,
    pub kind: ProbeKind,
    pub payload: Vec<u8>,
    pub target: Option<TargetDescriptor>,
    pub target_agent: Option<AgentId>,
}

impl ProbeSubmission {
    /// The kind whose handler processes this submission. Only the relay kind
    /// is ever redirected, and only when its target packed a kind.
    pub fn effective_kind(&self) -> &ProbeKind {
        if self.kind.is_relay() {
            if let Some(kind) = self
                .target
                .as_ref()
                .and_then(|target| target.effective_kind.as_ref())
            {
                return kind;
            }
        }
        &self.kind
    }

    pub fn addressed_value(&self) -> Option<&str> {
        self.target
            .as_ref()
            .map(|target| target.addressed_value.as_str())
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// The record agents send. Timestamps and the submitting agent are optional
/// and filled in by the ingest gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSubmission {
    #[serde(default = "Uuid::new_v4")]
    pub id: SubmissionId,
    pub probe_id: ProbeId,
    pub original_agent_id: AgentId,
    #[serde(default)]
    pub submitting_agent_id: Option<AgentId>,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: ProbeKind,
    /// Either embedded JSON or a string holding the raw payload.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_agent: Option<AgentId>,
}

impl WireSubmission {
    /// Shapes metadata only: defaults timestamps and the submitting agent, and
    /// decodes the packed target.
    pub fn normalize(self, now: DateTime<Utc>) -> crate::Result<ProbeSubmission> {
        let created_at = self.created_at.unwrap_or(now);
        let payload = match self.payload {
            serde_json::Value::String(raw) => raw.into_bytes(),
            other => serde_json::to_vec(&other)?,
        };

        Ok(ProbeSubmission {
            id: self.id,
            probe_id: self.probe_id,
            original_agent_id: self.original_agent_id,
            submitting_agent_id: self.submitting_agent_id.unwrap_or(self.original_agent_id),
            triggered: self.triggered,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            received_at: now,
            kind: self.kind,
            payload,
            target: self.target.as_deref().map(TargetDescriptor::parse),
            target_agent: self.target_agent,
        })
    }
}
