//! Execution record entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use opshub_core::types::id::{CronjobId, RecordId};

use super::status::RecordStatus;

/// One historical execution outcome of a cron job.
///
/// The job reference is weak: cleanup before job deletion detaches records
/// that carry backup artifacts (sets `cronjob_id` to `None`) so backup
/// history stays auditable after the job is gone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Record {
    /// Unique record identifier.
    pub id: RecordId,
    /// Owning job, absent once detached.
    pub cronjob_id: Option<CronjobId>,
    /// When the execution started.
    pub start_time: DateTime<Utc>,
    /// Outcome status.
    pub status: RecordStatus,
    /// Error message for failed executions.
    pub message: Option<String>,
    /// Path of the backup artifact this execution produced.
    pub artifact_path: Option<String>,
    /// Path of the execution log file.
    pub log_path: Option<String>,
    /// Whether the artifact lives on the local filesystem.
    pub from_local: bool,
}

/// Data required to append a new execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    /// Owning job.
    pub cronjob_id: Option<CronjobId>,
    /// When the execution started.
    pub start_time: DateTime<Utc>,
    /// Initial status (`Running` for live executions).
    pub status: RecordStatus,
    /// Error message, if already known.
    pub message: Option<String>,
    /// Artifact path, if already known.
    pub artifact_path: Option<String>,
    /// Execution log file path.
    pub log_path: Option<String>,
    /// Whether the artifact lives on the local filesystem.
    pub from_local: bool,
}
