//! Job runner — executes one firing of a cron job.
//!
//! Resolves the job at fire time, drives the action invoker with the
//! job's retry policy, records the outcome, triggers retention trimming,
//! and reports to the alert bridge. Overlapping firings of the same job
//! are permitted to run concurrently; there is no deduplication here.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use opshub_core::result::AppResult;
use opshub_core::types::id::CronjobId;
use opshub_database::repositories::{CronjobRepository, RecordRepository};
use opshub_entity::cronjob::Cronjob;
use opshub_entity::record::{NewRecord, Record, RecordStatus};

use crate::alert::AlertBridge;
use crate::logfile;
use crate::retention::RetentionManager;

/// Result of a successful action invocation.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    /// Paths of the produced backup artifacts, if any.
    pub artifacts: Vec<String>,
    /// Whether the artifacts live on the local filesystem.
    pub from_local: bool,
}

/// Contract for the concrete action drivers (dump, snapshot, rotation).
///
/// The driver owns per-attempt timeout enforcement; the job carries
/// `timeout_seconds` for it.
#[async_trait]
pub trait ActionInvoker: Send + Sync + 'static {
    /// Execute one occurrence of the job.
    async fn invoke(&self, job: &Cronjob) -> AppResult<ActionOutput>;
}

/// Executes job occurrences and records their outcomes.
pub struct JobRunner {
    jobs: Arc<CronjobRepository>,
    records: Arc<RecordRepository>,
    retention: Arc<RetentionManager>,
    alerts: Arc<dyn AlertBridge>,
    invoker: Arc<dyn ActionInvoker>,
    data_dir: PathBuf,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl JobRunner {
    /// Create a new job runner.
    pub fn new(
        jobs: Arc<CronjobRepository>,
        records: Arc<RecordRepository>,
        retention: Arc<RetentionManager>,
        alerts: Arc<dyn AlertBridge>,
        invoker: Arc<dyn ActionInvoker>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            jobs,
            records,
            retention,
            alerts,
            invoker,
            data_dir,
        }
    }

    /// Execute one firing of the job. Never fails the caller: bookkeeping
    /// errors are logged, since a firing has nobody to propagate to.
    pub async fn handle(&self, id: CronjobId) {
        if let Err(e) = self.run_once(id).await {
            error!("Execution bookkeeping for cron job {} failed: {}", id, e);
        }
    }

    async fn run_once(&self, id: CronjobId) -> AppResult<()> {
        let Some(job) = self.jobs.find_by_id(id).await? else {
            warn!("Cron job {} fired but no longer exists", id);
            return Ok(());
        };

        let start = Utc::now();
        let log_path = logfile::record_log_path(&self.data_dir, job.id, start);
        let record = self
            .records
            .append(&NewRecord {
                cronjob_id: Some(job.id),
                start_time: start,
                status: RecordStatus::Running,
                message: None,
                artifact_path: None,
                log_path: Some(log_path.display().to_string()),
                from_local: false,
            })
            .await?;

        info!("Cron job '{}' ({}) started", job.name, job.job_type);
        logfile::append(&log_path, &format!("job '{}' started", job.name)).await;

        let max_attempts = job.retry_times.max(0) + 1;
        let mut outcome: AppResult<ActionOutput> = Err(opshub_core::AppError::execution(
            "action was never attempted",
        ));
        for attempt in 1..=max_attempts {
            match self.invoker.invoke(&job).await {
                Ok(output) => {
                    logfile::append(&log_path, &format!("attempt {attempt} succeeded")).await;
                    outcome = Ok(output);
                    break;
                }
                Err(e) => {
                    warn!(
                        "Cron job '{}' attempt {}/{} failed: {}",
                        job.name, attempt, max_attempts, e
                    );
                    logfile::append(&log_path, &format!("attempt {attempt} failed: {e}")).await;
                    outcome = Err(e);
                }
            }
        }

        let finished = match outcome {
            Ok(output) => self.finish_success(&job, record, output).await?,
            Err(e) => {
                let message = e.to_string();
                self.records
                    .mark_finished(record.id, RecordStatus::Failed, Some(&message), None, false)
                    .await?;
                error!("Cron job '{}' failed: {}", job.name, message);
                Record {
                    status: RecordStatus::Failed,
                    message: Some(message),
                    ..record
                }
            }
        };

        if finished.status == RecordStatus::Failed && job.ignore_err {
            debug!(
                "Cron job '{}' failure alert suppressed (ignore_err)",
                job.name
            );
        } else {
            self.report_outcome(&job, &finished).await;
        }
        Ok(())
    }

    async fn finish_success(
        &self,
        job: &Cronjob,
        record: Record,
        output: ActionOutput,
    ) -> AppResult<Record> {
        let first = output.artifacts.first().cloned();
        self.records
            .mark_finished(
                record.id,
                RecordStatus::Success,
                None,
                first.as_deref(),
                output.from_local,
            )
            .await?;

        // Additional artifacts get sibling records sharing the start time
        // so retention counts every copy.
        for artifact in output.artifacts.iter().skip(1) {
            self.records
                .append(&NewRecord {
                    cronjob_id: Some(job.id),
                    start_time: record.start_time,
                    status: RecordStatus::Success,
                    message: None,
                    artifact_path: Some(artifact.clone()),
                    log_path: None,
                    from_local: output.from_local,
                })
                .await?;
        }

        if job.retain_copies > 0 && job.job_type.has_backup() {
            let accounts = self.retention.resolve_accounts(job).await;
            if !accounts.is_empty() {
                if let Err(e) = self
                    .retention
                    .remove_expired(job, &accounts, Some(record.id))
                    .await
                {
                    warn!("Retention trim for cron job '{}' failed: {}", job.name, e);
                }
            }
        }

        info!("Cron job '{}' completed successfully", job.name);
        Ok(Record {
            status: RecordStatus::Success,
            artifact_path: first,
            from_local: output.from_local,
            ..record
        })
    }

    async fn report_outcome(&self, job: &Cronjob, record: &Record) {
        match self.alerts.subscription(job.job_type, job.id).await {
            Ok(Some(subscription)) => {
                if let Err(e) = self.alerts.notify(&subscription, record).await {
                    warn!("Alert notification for cron job '{}' failed: {}", job.name, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Alert lookup for cron job '{}' failed: {}",
                job.name, e
            ),
        }
    }
}
