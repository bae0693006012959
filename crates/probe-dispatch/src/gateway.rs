//! Ingest Gateway
//!
//! Entry point for agent submissions. Shapes metadata, hands the submission
//! to the registry and reports the outcome. Delivery is at-least-once, so a
//! failed submission can simply be sent again.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use vigil_core::{Clock, Result, SystemClock, WireSubmission};

use crate::registry::Registry;

#[derive(Clone)]
pub struct IngestGateway {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for IngestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestGateway")
            .field("registry", &self.registry)
            .finish()
    }
}

impl IngestGateway {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    pub fn with_clock(registry: Arc<Registry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[instrument(skip(self, wire), fields(submission_id = %wire.id, agent_id = %wire.original_agent_id))]
    pub async fn submit(&self, wire: WireSubmission) -> Result<()> {
        let submission = wire.normalize(self.clock.now())?;
        match self.registry.dispatch(&submission).await {
            Ok(()) => {
                info!(kind = %submission.effective_kind(), "Accepted probe result");
                Ok(())
            }
            Err(err) => {
                warn!(
                    kind = %submission.effective_kind(),
                    retryable = err.is_retryable(),
                    "Rejected probe result: {}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Submits each entry independently; one failure never stops the rest.
    pub async fn submit_batch(&self, batch: Vec<WireSubmission>) -> Vec<Result<()>> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for wire in batch {
            outcomes.push(self.submit(wire).await);
        }
        outcomes
    }
}
