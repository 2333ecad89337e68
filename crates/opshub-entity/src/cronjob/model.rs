//! Cron job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opshub_core::types::id::{AccountId, CronjobId, EntryId};

use super::selector::SourceSelector;
use super::status::{JobStatus, JobType};
use crate::alert::AlertConfig;

/// A persisted recurring maintenance job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cronjob {
    /// Unique job identifier.
    pub id: CronjobId,
    /// Unique job name.
    pub name: String,
    /// Kind of maintenance work.
    pub job_type: JobType,
    /// Trigger spec: one or more comma-separated cron/interval expressions.
    pub spec: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Interpreter used for script execution (e.g. `"bash"`).
    pub executor: String,
    /// Command line for shell jobs.
    pub command: String,
    /// Inline script body for shell jobs.
    pub script: String,
    /// Which backup sources the job covers.
    pub sources: SourceSelector,
    /// Accounts that receive backup artifacts, in configuration order.
    pub source_account_ids: Vec<AccountId>,
    /// Preferred account for artifact downloads.
    pub download_account_id: Option<AccountId>,
    /// Maximum surviving artifacts per source account; `0` disables
    /// trimming.
    pub retain_copies: i64,
    /// Retries after a failed attempt.
    pub retry_times: i64,
    /// Per-attempt timeout in seconds, enforced by the action driver.
    pub timeout_seconds: i64,
    /// Record failures without escalating them to the alert bridge.
    pub ignore_err: bool,
    /// Secret passed through to the action driver.
    pub secret: String,
    /// Snapshot policy payload, opaque to this core.
    pub snapshot_rule: Option<serde_json::Value>,
    /// Live entry handles, one per trigger segment. Derived state: empty
    /// unless the job status is `Enable`.
    pub entry_ids: Vec<EntryId>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Cronjob {
    /// Trigger segments of the raw spec, trimmed.
    pub fn spec_segments(&self) -> Vec<&str> {
        self.spec.split(',').map(str::trim).collect()
    }
}

/// Mutable job fields accepted by create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronjobOperate {
    /// Unique job name.
    pub name: String,
    /// Kind of maintenance work. Ignored on update: the type of an
    /// existing job never changes.
    pub job_type: JobType,
    /// Trigger spec: one or more comma-separated cron/interval expressions.
    pub spec: String,
    /// Interpreter used for script execution.
    #[serde(default)]
    pub executor: String,
    /// Command line for shell jobs.
    #[serde(default)]
    pub command: String,
    /// Inline script body for shell jobs.
    #[serde(default)]
    pub script: String,
    /// Which backup sources the job covers.
    #[serde(default)]
    pub sources: SourceSelector,
    /// Accounts that receive backup artifacts.
    #[serde(default)]
    pub source_account_ids: Vec<AccountId>,
    /// Preferred account for artifact downloads.
    #[serde(default)]
    pub download_account_id: Option<AccountId>,
    /// Maximum surviving artifacts per source account.
    #[serde(default)]
    pub retain_copies: i64,
    /// Retries after a failed attempt.
    #[serde(default)]
    pub retry_times: i64,
    /// Per-attempt timeout in seconds.
    #[serde(default)]
    pub timeout_seconds: i64,
    /// Record failures without escalating them.
    #[serde(default)]
    pub ignore_err: bool,
    /// Secret passed through to the action driver.
    #[serde(default)]
    pub secret: String,
    /// Snapshot policy payload.
    #[serde(default)]
    pub snapshot_rule: Option<serde_json::Value>,
    /// Alert subscription settings, if outcome alerting is wanted.
    #[serde(default)]
    pub alert: Option<AlertConfig>,
}
