//! Speed-test endpoints an agent reports as reachable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Most recent report for one `(agent, server_id)` pair. Replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedServer {
    pub agent_id: AgentId,
    pub server_id: String,
    pub name: String,
    pub host: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub sponsor: Option<String>,
    pub distance_km: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// One endpoint as announced by the agent, before it is keyed to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    #[serde(alias = "id")]
    pub server_id: String,
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sponsor: Option<String>,
    #[serde(default, alias = "distance")]
    pub distance_km: Option<f64>,
}

impl ServerEntry {
    pub fn into_cached(self, agent_id: AgentId, at: DateTime<Utc>) -> CachedServer {
        CachedServer {
            agent_id,
            server_id: self.server_id,
            name: self.name,
            host: self.host,
            location: self.location,
            country: self.country,
            sponsor: self.sponsor,
            distance_km: self.distance_km,
            updated_at: at,
        }
    }
}
