use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vigil_core::{CachedServer, ProbeKind, ProbeSubmission, Result, ServerEntry, Store};

use super::{invalid, Recorder};
use crate::handler::{ProbeHandler, ProbeResult};

/// An agent's full re-announcement of the speed-test endpoints it can reach.
pub struct SpeedtestServersHandler {
    recorder: Recorder,
}

impl SpeedtestServersHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            recorder: Recorder::new(store),
        }
    }
}

#[async_trait]
impl ProbeHandler for SpeedtestServersHandler {
    fn kind(&self) -> ProbeKind {
        ProbeKind::SPEEDTEST_SERVERS
    }

    fn decode(&self, submission: &ProbeSubmission) -> Result<ProbeResult> {
        let servers: Vec<ServerEntry> = submission.decode_payload()?;
        let mut seen = HashSet::new();
        for server in &servers {
            if server.server_id.trim().is_empty() {
                return Err(invalid(submission, "server entry without an id"));
            }
            if !seen.insert(server.server_id.as_str()) {
                return Err(invalid(
                    submission,
                    format!("server {} reported twice", server.server_id),
                ));
            }
        }
        Ok(ProbeResult::SpeedtestServers(servers))
    }

    async fn process(&self, submission: &ProbeSubmission, result: ProbeResult) -> Result<()> {
        let ProbeResult::SpeedtestServers(servers) = result else {
            return Err(invalid(
                submission,
                "server list handler received a foreign result",
            ));
        };

        let agent_id = submission.original_agent_id;
        let cached: Vec<CachedServer> = servers
            .into_iter()
            .map(|server| server.into_cached(agent_id, submission.updated_at))
            .collect();
        self.recorder
            .store()
            .upsert_servers_for_agent(agent_id, &cached)
            .await?;
        info!(%agent_id, count = cached.len(), "Cached speed-test servers refreshed");

        self.recorder.touch(submission).await
    }
}
