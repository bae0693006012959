//! Offline-agent alerting
//!
//! The alert pass hands the current time to an [`AlertEvaluator`]. The
//! built-in evaluator finds agents that have been silent for longer than the
//! configured threshold and reports each one once per outage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use vigil_core::{AgentId, AgentRecord, Clock, Result, Store, VigilError, WorkspaceId};

use crate::periodic::Pass;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAgentAlert {
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub agent_name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
}

impl OfflineAgentAlert {
    fn for_agent(agent: &AgentRecord, detected_at: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent.id,
            workspace_id: agent.workspace_id,
            agent_name: agent.name.clone(),
            last_seen_at: agent.last_seen_at,
            detected_at,
        }
    }
}

/// Decides which alerts are due at `now` and raises them. Returns how many
/// fired.
#[async_trait]
pub trait AlertEvaluator: Send + Sync + 'static {
    async fn evaluate(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Where raised alerts go.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn deliver(&self, alert: &OfflineAgentAlert) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &OfflineAgentAlert) -> Result<()> {
        warn!(
            agent_id = %alert.agent_id,
            workspace_id = %alert.workspace_id,
            agent = %alert.agent_name,
            last_seen_at = ?alert.last_seen_at,
            "Agent is offline"
        );
        Ok(())
    }
}

/// Posts each alert as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, alert: &OfflineAgentAlert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| VigilError::delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::delivery(format!(
                "webhook responded with {status}"
            )));
        }
        Ok(())
    }
}

pub struct OfflineAgentEvaluator {
    store: Arc<dyn Store>,
    sink: Arc<dyn AlertSink>,
    threshold: Duration,
}

impl OfflineAgentEvaluator {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn AlertSink>, threshold: Duration) -> Self {
        Self {
            store,
            sink,
            threshold,
        }
    }
}

#[async_trait]
impl AlertEvaluator for OfflineAgentEvaluator {
    /// An agent whose alert could not be delivered stays unmarked and is
    /// retried on the next pass. A failure on one agent never stops the rest.
    #[instrument(skip(self))]
    async fn evaluate(&self, now: DateTime<Utc>) -> Result<usize> {
        let agents = self
            .store
            .list_agents_needing_offline_alert(now, self.threshold)
            .await?;

        let mut raised = 0;
        for agent in agents {
            let alert = OfflineAgentAlert::for_agent(&agent, now);
            if let Err(e) = self.sink.deliver(&alert).await {
                warn!(agent_id = %agent.id, "Offline alert not delivered: {}", e);
                continue;
            }
            if let Err(e) = self.store.mark_agent_offline_alerted(agent.id, now).await {
                warn!(agent_id = %agent.id, "Offline alert delivered but not recorded: {}", e);
                continue;
            }
            raised += 1;
        }

        if raised > 0 {
            info!(raised, "Raised offline agent alerts");
        }
        Ok(raised)
    }
}

/// Scheduler adapter around an evaluator.
pub struct AlertPass {
    evaluator: Arc<dyn AlertEvaluator>,
    clock: Arc<dyn Clock>,
}

impl AlertPass {
    pub fn new(evaluator: Arc<dyn AlertEvaluator>, clock: Arc<dyn Clock>) -> Self {
        Self { evaluator, clock }
    }
}

#[async_trait]
impl Pass for AlertPass {
    async fn run(&self) -> Result<()> {
        self.evaluator.evaluate(self.clock.now()).await.map(|_| ())
    }
}
