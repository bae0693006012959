//! Background work that runs independently of request handling: the
//! soft-delete and queue cleanup sweep, offline-agent alerting, and the
//! retention policy applied at startup.

pub use vigil_core;

mod alerts;
mod cleanup;
mod periodic;
mod retention;
mod scheduler;
#[cfg(test)]
mod test_support;

pub use alerts::{
    AlertEvaluator, AlertPass, AlertSink, LogAlertSink, OfflineAgentAlert,
    OfflineAgentEvaluator, WebhookAlertSink,
};
pub use cleanup::{CleanupReport, CleanupSweep};
pub use periodic::{Pass, PeriodicTask, MAX_PASS_TIMEOUT};
pub use retention::apply_retention;
pub use scheduler::Scheduler;
