//! Dispatch Registry
//!
//! Owns the kind-to-handler mapping. Registration happens at startup and
//! takes the write lock; dispatch only ever clones a handler out under a
//! short read lock, so any number of dispatches run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};
use vigil_core::{ProbeKind, ProbeSubmission, Result, Store, VigilError};

use crate::handler::ProbeHandler;
use crate::handlers::default_handlers;

#[derive(Default)]
pub struct Registry {
    handlers: RwLock<HashMap<ProbeKind, Arc<dyn ProbeHandler>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in handler installed against `store`.
    pub fn with_default_handlers(store: Arc<dyn Store>) -> Self {
        let registry = Self::new();
        for handler in default_handlers(store) {
            registry.register(handler);
        }
        registry
    }

    /// Installs `handler` under its own kind, replacing any previous one.
    pub fn register(&self, handler: Arc<dyn ProbeHandler>) {
        let kind = handler.kind();
        let replaced = self.handlers.write().insert(kind.clone(), handler);
        if replaced.is_some() {
            info!(%kind, "Replaced probe handler");
        } else {
            info!(%kind, "Registered probe handler");
        }
    }

    pub fn has(&self, kind: &ProbeKind) -> bool {
        self.handlers.read().contains_key(kind)
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<ProbeKind> {
        let mut kinds: Vec<ProbeKind> = self.handlers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    fn handler_for(&self, kind: &ProbeKind) -> Option<Arc<dyn ProbeHandler>> {
        self.handlers.read().get(kind).cloned()
    }

    /// Routes `submission` to the handler for its effective kind.
    ///
    /// A missing handler and any decode or validation failure are reported as
    /// dispatch errors before `process` runs. Errors from `process` are
    /// returned as-is.
    #[instrument(
        skip(self, submission),
        fields(
            submission_id = %submission.id,
            declared = %submission.kind,
            kind = %submission.effective_kind(),
        )
    )]
    pub async fn dispatch(&self, submission: &ProbeSubmission) -> Result<()> {
        let kind = submission.effective_kind();
        let handler = self
            .handler_for(kind)
            .ok_or_else(|| VigilError::dispatch(kind.as_str(), "no handler registered"))?;

        let result = handler.decode(submission).map_err(|err| match err {
            VigilError::Dispatch { .. } => err,
            other => VigilError::dispatch(kind.as_str(), other.to_string()),
        })?;

        handler.process(submission, result).await?;
        debug!("Submission processed");
        Ok(())
    }
}
