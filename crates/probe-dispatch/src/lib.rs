pub use vigil_core;

mod gateway;
mod handler;
pub mod handlers;
mod registry;

pub use gateway::IngestGateway;
pub use handler::{ProbeHandler, ProbeResult};
pub use registry::Registry;

// Re-export core types for convenience
pub use vigil_core::{ProbeKind, ProbeSubmission, Result, VigilError, WireSubmission};
