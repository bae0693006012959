pub use vigil_core;

mod queue;

pub use queue::{JobQueue, QueueCounts};

// Re-export core types for convenience
pub use vigil_core::{
    NewQueueItem, QueueFilter, QueueItem, QueueItemId, QueueStatus, Result, VigilError,
    QUEUE_ITEM_TTL,
};
