//! Execution log files.
//!
//! Every execution record may carry a log file under
//! `<data_dir>/logs/cronjob/<job id>/`. Log I/O is best effort: a missing
//! file reads as empty content and write failures are logged warnings,
//! never errors, so log loss cannot block execution or cleanup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use opshub_core::types::id::CronjobId;

/// Directory holding one job's execution logs.
pub fn record_log_dir(data_dir: &Path, job: CronjobId) -> PathBuf {
    data_dir.join("logs").join("cronjob").join(job.to_string())
}

/// Log file path for one execution. Overlapping executions of the same
/// job may share a start second, so the name carries a random suffix.
pub fn record_log_path(data_dir: &Path, job: CronjobId, start: DateTime<Utc>) -> PathBuf {
    let suffix = Uuid::new_v4().simple().to_string();
    record_log_dir(data_dir, job).join(format!(
        "{}-{}.log",
        start.format("%Y%m%d-%H%M%S"),
        &suffix[..8]
    ))
}

/// Append one timestamped line to a log file, creating it as needed.
pub async fn append(path: &Path, line: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Failed to create log directory '{}': {}", parent.display(), e);
            return;
        }
    }

    let entry = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), line);
    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(mut file) => {
            if let Err(e) = file.write_all(entry.as_bytes()).await {
                warn!("Failed to write log file '{}': {}", path.display(), e);
            }
        }
        Err(e) => warn!("Failed to open log file '{}': {}", path.display(), e),
    }
}

/// Read a log file. A missing path or unreadable file yields empty
/// content.
pub async fn read(path: Option<&str>) -> String {
    match path {
        Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Remove a log file if it exists.
pub async fn remove(path: Option<&str>) {
    if let Some(path) = path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove log file '{}': {}", path, e);
            }
        }
    }
}
