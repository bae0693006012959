//! Built-in handlers, one per probe kind

mod mtr;
mod netinfo;
mod ping;
mod speedtest;
mod speedtest_servers;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use vigil_core::{ProbeResultRecord, ProbeSubmission, Result, Store, VigilError};

use crate::handler::ProbeHandler;

pub use mtr::{MtrHandler, MtrHop, MtrResult};
pub use netinfo::{NetInfoHandler, NetInfoResult};
pub use ping::{PingHandler, PingResult};
pub use speedtest::{SpeedtestHandler, SpeedtestResult};
pub use speedtest_servers::SpeedtestServersHandler;

/// Every built-in handler sharing one store.
pub fn default_handlers(store: Arc<dyn Store>) -> Vec<Arc<dyn ProbeHandler>> {
    vec![
        Arc::new(PingHandler::new(store.clone())),
        Arc::new(MtrHandler::new(store.clone())),
        Arc::new(SpeedtestHandler::new(store.clone())),
        Arc::new(SpeedtestServersHandler::new(store.clone())),
        Arc::new(NetInfoHandler::new(store)),
    ]
}

/// Side effects shared by the time-series handlers.
#[derive(Clone)]
pub(crate) struct Recorder {
    store: Arc<dyn Store>,
}

impl Recorder {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Appends the result row, then moves the originating agent's last-seen
    /// marker forward.
    pub(crate) async fn record<T: Serialize>(
        &self,
        submission: &ProbeSubmission,
        observed_at: DateTime<Utc>,
        data: &T,
    ) -> Result<()> {
        let data = serde_json::to_value(data)?;
        let record = ProbeResultRecord::from_submission(submission, observed_at, data);
        self.store.append_probe_result(&record).await?;
        self.touch(submission).await
    }

    /// Agent clocks are untrusted, so last-seen never moves past the time the
    /// submission was received.
    pub(crate) async fn touch(&self, submission: &ProbeSubmission) -> Result<()> {
        let agent_id = submission.original_agent_id;
        let seen_at = submission.updated_at.min(submission.received_at);
        let moved = self.store.touch_agent_last_seen(agent_id, seen_at).await?;
        if !moved {
            debug!(%agent_id, "last-seen unchanged");
        }
        Ok(())
    }
}

/// Validation failures surface as dispatch errors for the submission's kind.
pub(crate) fn invalid(submission: &ProbeSubmission, reason: impl Into<String>) -> VigilError {
    VigilError::dispatch(submission.effective_kind().as_str(), reason)
}

pub(crate) fn check_percent(
    submission: &ProbeSubmission,
    field: &str,
    value: f64,
) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(invalid(
            submission,
            format!("{field} must be between 0 and 100, got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_non_negative(
    submission: &ProbeSubmission,
    field: &str,
    value: f64,
) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(
            submission,
            format!("{field} must be a finite non-negative number, got {value}"),
        ));
    }
    Ok(())
}
