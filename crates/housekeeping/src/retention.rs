//! Time-based expiration for raw telemetry tables

use tracing::{info, warn};
use vigil_core::{RetentionConfig, Store, RAW_TELEMETRY_TABLES};

/// Installs the retention window on every raw telemetry table. Failures are
/// logged and skipped; the table may not exist yet. Returns how many tables
/// accepted the policy.
pub async fn apply_retention(store: &dyn Store, config: &RetentionConfig) -> usize {
    let window = config.retention_window();
    let mut applied = 0;

    for table in RAW_TELEMETRY_TABLES {
        match store.apply_retention_policy(table, window).await {
            Ok(()) => {
                info!(table, days = config.retention_days, "Retention policy applied");
                applied += 1;
            }
            Err(e) => warn!(table, "Could not apply retention policy: {}", e),
        }
    }

    applied
}
