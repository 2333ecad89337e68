//! Cron scheduler configuration.

use serde::{Deserialize, Serialize};

/// Cron scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval in seconds between firing-table checks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Root directory for job scripts, record logs, and downloads.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            tick_interval_seconds: default_tick_interval(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    1
}

fn default_data_dir() -> String {
    "data".to_string()
}
