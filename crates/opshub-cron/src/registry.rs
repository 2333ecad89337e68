//! The cron job registry.
//!
//! `CronjobService` owns job CRUD, keeps the firing table consistent with
//! the persisted registry on every mutation, and orchestrates the runner,
//! retention manager, and alert bridge. It also carries the portable
//! export/import pass that swaps numeric foreign keys for resolvable
//! names.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use opshub_core::error::AppError;
use opshub_core::result::AppResult;
use opshub_core::traits::account::AccountResolver;
use opshub_core::traits::resolver::SourceResolver;
use opshub_core::types::id::{AccountId, CronjobId, EntryId, RecordId};
use opshub_core::types::pagination::PageResponse;
use opshub_database::repositories::{
    CronjobRepository, CronjobSearch, RecordRepository, RecordSearch,
};
use opshub_entity::alert::AlertConfig;
use opshub_entity::cronjob::{Cronjob, CronjobOperate, JobStatus, JobType, SourceSelector};
use opshub_entity::record::{Record, RecordStatus};
use opshub_entity::transfer::{TransferSelector, TransferableJob};

use crate::alert::AlertBridge;
use crate::engine::{CronEngine, EntryCallback};
use crate::logfile;
use crate::retention::RetentionManager;
use crate::runner::JobRunner;
use crate::spec::{self, TriggerSpec};

/// A job enriched with its latest outcome and alert binding for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronjobInfo {
    /// The job itself.
    pub job: Cronjob,
    /// Status of the most recent execution, if any.
    pub last_record_status: Option<RecordStatus>,
    /// Start time of the most recent execution, if any.
    pub last_record_time: Option<DateTime<Utc>>,
    /// Failure-count threshold of the live alert subscription, 0 if none.
    pub alert_count: i64,
    /// Resolved source account names.
    pub source_accounts: Vec<String>,
    /// Resolved download account name.
    pub download_account: Option<String>,
}

/// Batch delete request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Jobs to delete.
    pub ids: Vec<CronjobId>,
    /// Also delete surviving backup artifacts on local accounts.
    #[serde(default)]
    pub clean_data: bool,
    /// Extend artifact deletion to remote accounts.
    #[serde(default)]
    pub clean_remote_data: bool,
}

/// One failed item of a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    /// The failing job, by id or name.
    pub item: String,
    /// Why it failed.
    pub message: String,
}

/// Outcome of a batch delete. Failing items never abort the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Number of jobs fully deleted.
    pub deleted: usize,
    /// Per-item failures.
    pub failures: Vec<BatchFailure>,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// Jobs imported as `Disable`.
    pub imported: Vec<String>,
    /// Jobs skipped because the name already exists.
    pub skipped: Vec<String>,
    /// Jobs imported as `Pending` because a reference did not resolve.
    pub pending: Vec<String>,
}

/// CRUD and orchestration over cron job definitions.
pub struct CronjobService {
    jobs: Arc<CronjobRepository>,
    records: Arc<RecordRepository>,
    engine: Arc<CronEngine>,
    runner: Arc<JobRunner>,
    retention: Arc<RetentionManager>,
    accounts: Arc<dyn AccountResolver>,
    apps: Arc<dyn SourceResolver>,
    websites: Arc<dyn SourceResolver>,
    databases: Arc<dyn SourceResolver>,
    alerts: Arc<dyn AlertBridge>,
    data_dir: PathBuf,
}

impl fmt::Debug for CronjobService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronjobService")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
impl CronjobService {
    /// Create a new cron job service.
    pub fn new(
        jobs: Arc<CronjobRepository>,
        records: Arc<RecordRepository>,
        engine: Arc<CronEngine>,
        runner: Arc<JobRunner>,
        retention: Arc<RetentionManager>,
        accounts: Arc<dyn AccountResolver>,
        apps: Arc<dyn SourceResolver>,
        websites: Arc<dyn SourceResolver>,
        databases: Arc<dyn SourceResolver>,
        alerts: Arc<dyn AlertBridge>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            jobs,
            records,
            engine,
            runner,
            retention,
            accounts,
            apps,
            websites,
            databases,
            alerts,
            data_dir,
        }
    }

    /// Create a job. New jobs are enabled and registered immediately.
    pub async fn create(&self, req: CronjobOperate) -> AppResult<Cronjob> {
        if self.jobs.find_by_name(&req.name).await?.is_some() {
            return Err(AppError::conflict(format!(
                "cron job '{}' already exists",
                req.name
            )));
        }
        validate_spec(&req.spec)?;

        let now = Utc::now();
        let mut job = Cronjob {
            id: CronjobId::from_raw(0),
            name: req.name,
            job_type: req.job_type,
            spec: req.spec,
            status: JobStatus::Enable,
            executor: req.executor,
            command: req.command,
            script: req.script,
            sources: req.sources,
            source_account_ids: req.source_account_ids,
            download_account_id: req.download_account_id,
            retain_copies: req.retain_copies,
            retry_times: req.retry_times,
            timeout_seconds: req.timeout_seconds,
            ignore_err: req.ignore_err,
            secret: req.secret,
            snapshot_rule: req.snapshot_rule,
            entry_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        // Log rotation always lands on the sole local backup destination.
        if job.job_type == JobType::CutWebsiteLog {
            let local = self.accounts.local().await?.ok_or_else(|| {
                AppError::configuration("no local backup account configured for log rotation")
            })?;
            job.source_account_ids = vec![local];
            job.download_account_id = Some(local);
        }

        let mut job = self.jobs.create(&job).await?;
        job.entry_ids = self.start_job(&job).await?;
        self.jobs.update_entries(job.id, &job.entry_ids).await?;

        if let Some(alert) = &req.alert {
            if alert.send_count > 0 {
                self.alerts
                    .create(alert.subscribe(job.job_type, job.id))
                    .await?;
            }
        }

        info!("Created cron job '{}' with spec '{}'", job.name, job.spec);
        Ok(job)
    }

    /// Update a job's mutable fields.
    ///
    /// While the job is enabled, every previous handle is unregistered
    /// before fresh ones are registered from the new spec, so the firing
    /// table matches the latest spec exactly — never a superset of
    /// old and new. A successful update of a `Pending` job repairs it
    /// to `Enable`.
    pub async fn update(&self, id: CronjobId, req: CronjobOperate) -> AppResult<Cronjob> {
        let current = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("cron job {id} not found")))?;
        if req.name != current.name && self.jobs.find_by_name(&req.name).await?.is_some() {
            return Err(AppError::conflict(format!(
                "cron job '{}' already exists",
                req.name
            )));
        }
        validate_spec(&req.spec)?;

        let mut job = Cronjob {
            id: current.id,
            name: req.name,
            // the type of an existing job never changes
            job_type: current.job_type,
            spec: req.spec,
            status: current.status,
            executor: req.executor,
            command: req.command,
            script: req.script,
            sources: req.sources,
            source_account_ids: req.source_account_ids,
            download_account_id: req.download_account_id,
            retain_copies: req.retain_copies,
            retry_times: req.retry_times,
            timeout_seconds: req.timeout_seconds,
            ignore_err: req.ignore_err,
            secret: req.secret,
            snapshot_rule: req.snapshot_rule,
            entry_ids: Vec::new(),
            created_at: current.created_at,
            updated_at: Utc::now(),
        };

        self.engine.unregister_all(&current.entry_ids).await;
        if current.status == JobStatus::Pending {
            job.status = JobStatus::Enable;
        }
        if job.status == JobStatus::Enable {
            job.entry_ids = self.start_job(&job).await?;
        }
        self.jobs.update(&job).await?;

        match &req.alert {
            Some(alert) if alert.send_count > 0 => {
                self.alerts
                    .update(alert.subscribe(job.job_type, job.id))
                    .await?;
            }
            _ => self.alerts.remove(job.job_type, job.id).await?,
        }

        info!("Updated cron job '{}'", job.name);
        Ok(job)
    }

    /// Set a job's status. `Enable` registers handles from the stored
    /// spec; anything else leaves the handle set empty. The persisted
    /// handle set always reflects the firing table.
    pub async fn update_status(&self, id: CronjobId, status: JobStatus) -> AppResult<Cronjob> {
        let mut job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("cron job {id} not found")))?;

        self.engine.unregister_all(&job.entry_ids).await;
        job.status = status;
        job.entry_ids = if status == JobStatus::Enable {
            self.start_job(&job).await?
        } else {
            Vec::new()
        };
        self.jobs
            .update_status_entries(job.id, status, &job.entry_ids)
            .await?;

        info!("Cron job '{}' status set to {}", job.name, status);
        Ok(job)
    }

    /// Delete jobs. Per-item failures are reported and do not abort the
    /// remaining items.
    pub async fn delete(&self, req: &DeleteRequest) -> AppResult<DeleteReport> {
        let mut report = DeleteReport::default();
        for &id in &req.ids {
            match self
                .delete_one(id, req.clean_data, req.clean_remote_data)
                .await
            {
                Ok(name) => {
                    report.deleted += 1;
                    info!("Deleted cron job '{}'", name);
                }
                Err(e) => {
                    warn!("Failed to delete cron job {}: {}", id, e);
                    report.failures.push(BatchFailure {
                        item: id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    async fn delete_one(
        &self,
        id: CronjobId,
        clean_data: bool,
        clean_remote_data: bool,
    ) -> AppResult<String> {
        let job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("cron job {id} not found")))?;

        let script_dir = self.data_dir.join("scripts").join(&job.name);
        if let Err(e) = tokio::fs::remove_dir_all(&script_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove script dir '{}': {}",
                    script_dir.display(),
                    e
                );
            }
        }

        self.engine.unregister_all(&job.entry_ids).await;
        self.retention
            .clean_record(&job, clean_data, clean_remote_data, true)
            .await?;
        self.jobs.delete(job.id).await?;
        self.alerts.remove(job.job_type, job.id).await?;
        Ok(job.name)
    }

    /// Page through jobs, each enriched with its latest record and alert
    /// binding.
    pub async fn page(&self, search: &CronjobSearch) -> AppResult<PageResponse<CronjobInfo>> {
        let (total, jobs) = self.jobs.page(search).await?;
        let mut items = Vec::with_capacity(jobs.len());
        for job in jobs {
            items.push(self.enrich(job).await?);
        }
        Ok(PageResponse::new(
            items,
            search.page.page,
            search.page.page_size,
            total,
        ))
    }

    /// Fetch one job enriched with its latest record and alert binding.
    pub async fn load_info(&self, id: CronjobId) -> AppResult<CronjobInfo> {
        let job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("cron job {id} not found")))?;
        self.enrich(job).await
    }

    async fn enrich(&self, job: Cronjob) -> AppResult<CronjobInfo> {
        let last = self.records.latest_by_job(job.id).await?;
        let alert_count = match self.alerts.subscription(job.job_type, job.id).await {
            Ok(Some(subscription)) => subscription.send_count,
            Ok(None) => 0,
            Err(e) => {
                warn!("Alert lookup for cron job '{}' failed: {}", job.name, e);
                0
            }
        };

        let mut source_accounts = Vec::with_capacity(job.source_account_ids.len());
        for id in &job.source_account_ids {
            match self.accounts.name_of(*id).await {
                Ok(name) => source_accounts.push(name),
                Err(e) => warn!("Account {} of cron job '{}' unresolvable: {}", id, job.name, e),
            }
        }
        let download_account = match job.download_account_id {
            Some(id) => self.accounts.name_of(id).await.ok(),
            None => None,
        };

        Ok(CronjobInfo {
            last_record_status: last.as_ref().map(|record| record.status),
            last_record_time: last.map(|record| record.start_time),
            alert_count,
            source_accounts,
            download_account,
            job,
        })
    }

    /// Fire a job immediately through the normal execution path,
    /// regardless of its schedule or status.
    pub async fn handle_once(&self, id: CronjobId) -> AppResult<()> {
        let job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("cron job {id} not found")))?;
        info!("Manually firing cron job '{}'", job.name);
        self.runner.handle(job.id).await;
        Ok(())
    }

    /// Preview the next `n` firing times of a raw (possibly
    /// multi-segment) spec string.
    pub fn next_handles(&self, raw: &str, n: usize) -> AppResult<Vec<DateTime<Utc>>> {
        let now = Utc::now();
        let mut all = Vec::new();
        for segment in raw.split(',') {
            let parsed = spec::parse(segment)?;
            all.extend(spec::next_occurrences(&parsed, now, n)?);
        }
        all.sort();
        all.dedup();
        all.truncate(n);
        Ok(all)
    }

    /// Page through execution records.
    pub async fn search_records(&self, search: &RecordSearch) -> AppResult<PageResponse<Record>> {
        let (total, records) = self.records.page(search).await?;
        Ok(PageResponse::new(
            records,
            search.page.page,
            search.page.page_size,
            total,
        ))
    }

    /// Read a record's execution log. Missing logs read as empty content.
    pub async fn load_record_log(&self, id: RecordId) -> AppResult<String> {
        let record = self
            .records
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("record {id} not found")))?;
        Ok(logfile::read(record.log_path.as_deref()).await)
    }

    /// Produce a local path for a record's artifact, fetching it through
    /// the account's download capability when it is remote.
    pub async fn download_record(
        &self,
        record_id: RecordId,
        account_id: AccountId,
    ) -> AppResult<PathBuf> {
        let record = self
            .records
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("record {record_id} not found")))?;
        let artifact = record.artifact_path.as_deref().ok_or_else(|| {
            AppError::not_found(format!("record {record_id} has no artifact"))
        })?;

        let client = self.accounts.client(account_id).await?;
        if client.is_local() || record.from_local {
            let path = PathBuf::from(artifact);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(path);
            }
            return Err(AppError::not_found(format!(
                "artifact '{artifact}' missing on disk"
            )));
        }

        let target = self
            .data_dir
            .join("downloads")
            .join(artifact.trim_start_matches('/'));
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        client.download(artifact, &target).await?;
        Ok(target)
    }

    /// Export jobs in portable form, numeric foreign keys replaced by
    /// names. Unresolvable references are skipped with a warning; the
    /// batch always completes.
    pub async fn export(&self, ids: &[CronjobId]) -> AppResult<Vec<TransferableJob>> {
        let jobs = self.jobs.list_by_ids(ids).await?;
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            let sources = match (&job.sources, self.resolver_for(job.job_type)) {
                // `All` travels verbatim, never resolved.
                (SourceSelector::All, _) => TransferSelector::All,
                (SourceSelector::ByIds(ids), Some(resolver)) => {
                    let mut names = Vec::with_capacity(ids.len());
                    for id in ids {
                        match resolver.name_of(*id).await {
                            Ok(name) => names.push(name),
                            Err(e) => warn!(
                                "Skipping unresolvable source {} of cron job '{}': {}",
                                id, job.name, e
                            ),
                        }
                    }
                    TransferSelector::Names(names)
                }
                (SourceSelector::ByIds(_), None) => TransferSelector::All,
            };

            let mut source_accounts = Vec::with_capacity(job.source_account_ids.len());
            for id in &job.source_account_ids {
                match self.accounts.name_of(*id).await {
                    Ok(name) => source_accounts.push(name),
                    Err(e) => warn!(
                        "Skipping unresolvable account {} of cron job '{}': {}",
                        id, job.name, e
                    ),
                }
            }
            let download_account = match job.download_account_id {
                Some(id) => self.accounts.name_of(id).await.ok(),
                None => None,
            };

            let alert = match self.alerts.subscription(job.job_type, job.id).await {
                Ok(Some(subscription)) if subscription.send_count > 0 => {
                    Some(AlertConfig::from(&subscription))
                }
                _ => None,
            };

            out.push(TransferableJob {
                name: job.name,
                job_type: job.job_type,
                spec: job.spec,
                executor: job.executor,
                command: job.command,
                script: job.script,
                sources,
                source_accounts,
                download_account,
                retain_copies: job.retain_copies,
                retry_times: job.retry_times,
                timeout_seconds: job.timeout_seconds,
                ignore_err: job.ignore_err,
                secret: job.secret,
                snapshot_rule: job.snapshot_rule,
                alert,
            });
        }
        Ok(out)
    }

    /// Import jobs exported from another instance.
    ///
    /// Duplicate names are skipped. A job whose references all resolve
    /// lands as `Disable` (imported jobs never auto-run); any failed
    /// resolution marks it `Pending` instead — an explicit needs-repair
    /// signal, not a batch failure.
    pub async fn import(&self, items: Vec<TransferableJob>) -> AppResult<ImportReport> {
        let mut report = ImportReport::default();
        for item in items {
            if self.jobs.find_by_name(&item.name).await?.is_some() {
                info!("Skipping import of '{}': name already exists", item.name);
                report.skipped.push(item.name);
                continue;
            }

            let mut unresolved = false;
            let sources = match (&item.sources, self.resolver_for(item.job_type)) {
                (TransferSelector::All, _) => SourceSelector::All,
                (TransferSelector::Names(names), Some(resolver)) => {
                    let mut ids = Vec::with_capacity(names.len());
                    for name in names {
                        match resolver.id_of(name).await {
                            Ok(id) => ids.push(id),
                            Err(e) => {
                                warn!(
                                    "Source '{}' of imported job '{}' unresolvable: {}",
                                    name, item.name, e
                                );
                                unresolved = true;
                            }
                        }
                    }
                    SourceSelector::ByIds(ids)
                }
                (TransferSelector::Names(_), None) => SourceSelector::All,
            };

            let mut source_account_ids = Vec::with_capacity(item.source_accounts.len());
            let mut download_account_id = None;
            for name in &item.source_accounts {
                match self.accounts.id_of(name).await {
                    Ok(id) => {
                        if Some(name) == item.download_account.as_ref() {
                            download_account_id = Some(id);
                        }
                        source_account_ids.push(id);
                    }
                    Err(e) => {
                        warn!(
                            "Account '{}' of imported job '{}' unresolvable: {}",
                            name, item.name, e
                        );
                        unresolved = true;
                    }
                }
            }
            if item.download_account.is_some() && download_account_id.is_none() {
                unresolved = true;
            }

            let status = if unresolved {
                JobStatus::Pending
            } else {
                JobStatus::Disable
            };
            let now = Utc::now();
            let job = Cronjob {
                id: CronjobId::from_raw(0),
                name: item.name,
                job_type: item.job_type,
                spec: item.spec,
                status,
                executor: item.executor,
                command: item.command,
                script: item.script,
                sources,
                source_account_ids,
                download_account_id,
                retain_copies: item.retain_copies,
                retry_times: item.retry_times,
                timeout_seconds: item.timeout_seconds,
                ignore_err: item.ignore_err,
                secret: item.secret,
                snapshot_rule: item.snapshot_rule,
                entry_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            let job = self.jobs.create(&job).await?;

            if let Some(alert) = &item.alert {
                if alert.send_count > 0 {
                    if let Err(e) = self
                        .alerts
                        .create(alert.subscribe(job.job_type, job.id))
                        .await
                    {
                        warn!(
                            "Failed to recreate alert subscription for '{}': {}",
                            job.name, e
                        );
                    }
                }
            }

            match status {
                JobStatus::Pending => report.pending.push(job.name),
                _ => report.imported.push(job.name),
            }
        }
        Ok(report)
    }

    /// Re-register every enabled job at startup. A stored spec that no
    /// longer registers flips its job to `Pending` for repair instead of
    /// failing the boot.
    pub async fn resume(&self) -> AppResult<()> {
        let enabled = self.jobs.list_by_status(JobStatus::Enable).await?;
        let count = enabled.len();
        for job in enabled {
            match self.start_job(&job).await {
                Ok(entry_ids) => self.jobs.update_entries(job.id, &entry_ids).await?,
                Err(e) => {
                    warn!(
                        "Cron job '{}' failed to re-register ({}); marking pending",
                        job.name, e
                    );
                    self.jobs
                        .update_status_entries(job.id, JobStatus::Pending, &[])
                        .await?;
                }
            }
        }
        info!("Resumed {} enabled cron job(s)", count);
        Ok(())
    }

    /// Register one entry per trigger segment of the job's spec. On a
    /// partial failure every already-registered segment is rolled back.
    async fn start_job(&self, job: &Cronjob) -> AppResult<Vec<EntryId>> {
        let mut entry_ids = Vec::new();
        for segment in job.spec_segments() {
            let parsed = match spec::parse(segment) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.engine.unregister_all(&entry_ids).await;
                    return Err(e);
                }
            };
            let runner = Arc::clone(&self.runner);
            let job_id = job.id;
            let callback: EntryCallback = Arc::new(move || {
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    runner.handle(job_id).await;
                })
            });
            match self.engine.register(parsed, callback).await {
                Ok(id) => entry_ids.push(id),
                Err(e) => {
                    self.engine.unregister_all(&entry_ids).await;
                    return Err(e);
                }
            }
        }
        info!(
            "Registered {} trigger(s) for cron job '{}'",
            entry_ids.len(),
            job.name
        );
        Ok(entry_ids)
    }

    fn resolver_for(&self, job_type: JobType) -> Option<&Arc<dyn SourceResolver>> {
        match job_type {
            JobType::App => Some(&self.apps),
            JobType::Website => Some(&self.websites),
            JobType::Database => Some(&self.databases),
            _ => None,
        }
    }
}

/// Parse every comma-separated segment of a raw spec and confirm each one
/// has at least one future firing.
fn validate_spec(raw: &str) -> AppResult<Vec<TriggerSpec>> {
    let now = Utc::now();
    let mut parsed = Vec::new();
    for segment in raw.split(',') {
        let trigger = spec::parse(segment)?;
        spec::next_occurrences(&trigger, now, 1)?;
        parsed.push(trigger);
    }
    Ok(parsed)
}
