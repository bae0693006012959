//! Process-wide policy values, read once at startup

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Upper bound for day-based windows, roughly a century.
pub const MAX_DAYS: u32 = 36_500;
pub const MAX_INTERVAL_HOURS: u32 = 8_760;
pub const MAX_MINUTES: u32 = 525_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum age of raw telemetry and finished queue items.
    pub retention_days: u32,
    /// How long a soft-deleted row survives before the sweep hard-deletes it.
    pub soft_delete_grace_days: u32,
    pub cleanup_interval_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            soft_delete_grace_days: 30,
            cleanup_interval_hours: 24,
        }
    }
}

impl RetentionConfig {
    pub fn retention_window(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::days(i64::from(self.soft_delete_grace_days))
    }

    pub fn cleanup_interval(&self) -> StdDuration {
        StdDuration::from_secs(u64::from(self.cleanup_interval_hours) * 3600)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertScheduleConfig {
    pub offline_check_interval_minutes: u32,
    /// Silence after which an agent counts as offline.
    pub offline_threshold_minutes: u32,
}

impl Default for AlertScheduleConfig {
    fn default() -> Self {
        Self {
            offline_check_interval_minutes: 1,
            offline_threshold_minutes: 5,
        }
    }
}

impl AlertScheduleConfig {
    pub fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(u64::from(self.offline_check_interval_minutes) * 60)
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::minutes(i64::from(self.offline_threshold_minutes))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub retention: RetentionConfig,
    pub alerts: AlertScheduleConfig,
}

impl PolicyConfig {
    /// Rejects zero values, which would either delete live data or spin the
    /// schedulers, and values past the upper bounds, which would overflow
    /// date arithmetic.
    pub fn validate(self) -> Result<Self> {
        let checks = [
            ("retention-days", self.retention.retention_days, MAX_DAYS),
            (
                "soft-delete-grace-days",
                self.retention.soft_delete_grace_days,
                MAX_DAYS,
            ),
            (
                "cleanup-interval-hours",
                self.retention.cleanup_interval_hours,
                MAX_INTERVAL_HOURS,
            ),
            (
                "offline-check-interval-minutes",
                self.alerts.offline_check_interval_minutes,
                MAX_MINUTES,
            ),
            (
                "offline-threshold-minutes",
                self.alerts.offline_threshold_minutes,
                MAX_MINUTES,
            ),
        ];
        for (name, value, max) in checks {
            if value == 0 || value > max {
                return Err(VigilError::bad_input(format!(
                    "{name} must be between 1 and {max}, got {value}"
                )));
            }
        }
        Ok(self)
    }
}
