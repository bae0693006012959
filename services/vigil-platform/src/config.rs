use std::net::SocketAddr;

use clap::Parser;
use vigil_core::{AlertScheduleConfig, PolicyConfig, RetentionConfig};

/// Vigil platform service
#[derive(Parser, Debug, Clone)]
#[command(name = "vigil-platform", version, about)]
pub struct Args {
    /// Address for the operational endpoints
    #[arg(long, env = "VIGIL_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: SocketAddr,

    /// Maximum age of raw telemetry and finished queue items
    #[arg(long, env = "VIGIL_RETENTION_DAYS", default_value_t = 90)]
    pub retention_days: u32,

    /// How long soft-deleted rows are kept before they are purged
    #[arg(long, env = "VIGIL_SOFT_DELETE_GRACE_DAYS", default_value_t = 30)]
    pub soft_delete_grace_days: u32,

    #[arg(long, env = "VIGIL_CLEANUP_INTERVAL_HOURS", default_value_t = 24)]
    pub cleanup_interval_hours: u32,

    #[arg(long, env = "VIGIL_OFFLINE_CHECK_INTERVAL_MINUTES", default_value_t = 1)]
    pub offline_check_interval_minutes: u32,

    /// Silence after which an agent is reported offline
    #[arg(long, env = "VIGIL_OFFLINE_THRESHOLD_MINUTES", default_value_t = 5)]
    pub offline_threshold_minutes: u32,

    /// Offline alerts are posted here when set, logged otherwise
    #[arg(long, env = "VIGIL_ALERT_WEBHOOK_URL")]
    pub alert_webhook_url: Option<String>,

    /// PostgreSQL connection string; without it state is kept in memory
    #[cfg(feature = "postgres")]
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[cfg(feature = "postgres")]
    #[arg(long, env = "VIGIL_DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,
}

impl Args {
    pub fn policy(&self) -> vigil_core::Result<PolicyConfig> {
        PolicyConfig {
            retention: RetentionConfig {
                retention_days: self.retention_days,
                soft_delete_grace_days: self.soft_delete_grace_days,
                cleanup_interval_hours: self.cleanup_interval_hours,
            },
            alerts: AlertScheduleConfig {
                offline_check_interval_minutes: self.offline_check_interval_minutes,
                offline_threshold_minutes: self.offline_threshold_minutes,
            },
        }
        .validate()
    }
}
