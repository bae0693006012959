//! # Vigil Core
//!
//! Shared types for the Vigil telemetry-ingestion and job-scheduling core.
//!
//! - Probe submissions and the packed-target convention agents use to relay
//!   results of many kinds through one wire type
//! - The on-demand test queue item and its lifecycle graph
//! - The durable-store contract every component mutates state through
//! - Process-wide retention and alerting policy

pub mod agent;
pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod server;
pub mod store;
pub mod submission;
pub mod telemetry;

pub use agent::{AgentId, AgentRecord, AgentStatus, WorkspaceId};
pub use clock::{horizon, Clock, ManualClock, SystemClock};
pub use config::{AlertScheduleConfig, PolicyConfig, RetentionConfig};
pub use error::{Result, VigilError};
pub use queue::{
    NewQueueItem, QueueFilter, QueueItem, QueueItemId, QueueStatus, QueueTransition,
    QUEUE_ITEM_TTL,
};
pub use server::{CachedServer, ServerEntry};
pub use store::{GcEntity, MemoryStore, Store};
pub use submission::{
    ProbeId, ProbeKind, ProbeSubmission, SubmissionId, TargetDescriptor, WireSubmission,
    KIND_DELIMITER,
};
pub use telemetry::{ProbeResultRecord, RAW_TELEMETRY_TABLES};

/// Current Vigil version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Vigil build information for telemetry and debugging
pub const BUILD_INFO: &str = concat!(
    "Vigil ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Operational endpoints exposed by Vigil services
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
}
