//! Portable job representation for cross-instance export and import.

use serde::{Deserialize, Serialize};

use crate::alert::AlertConfig;
use crate::cronjob::status::JobType;

/// Source selection in portable form: names instead of local ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferSelector {
    /// Every source of the job's type. Preserved verbatim on export,
    /// never resolved.
    #[default]
    All,
    /// Explicit sources by stable name.
    Names(Vec<String>),
}

/// A job definition with numeric foreign keys replaced by resolvable
/// names, suitable for moving between OpsHub instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferableJob {
    /// Unique job name.
    pub name: String,
    /// Kind of maintenance work.
    pub job_type: JobType,
    /// Trigger spec, copied verbatim.
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
    /// Covered backup sources, by name.
    #[serde(default)]
    pub sources: TransferSelector,
    /// Backup destination accounts, by name.
    #[serde(default)]
    pub source_accounts: Vec<String>,
    /// Preferred download account, by name.
    #[serde(default)]
    pub download_account: Option<String>,
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
    /// Embedded alert subscription snapshot, if one existed.
    #[serde(default)]
    pub alert: Option<AlertConfig>,
}
