//! Retention trimming and record cleanup.
//!
//! Trimming deletes backup artifacts beyond a job's `retain_copies`,
//! oldest first, across every account in the given map, then removes the
//! corresponding record rows. A manual "run once" can race a scheduled
//! firing, so trims are serialized per (job, account) pair; locks are
//! always taken in ascending account-id order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use opshub_core::result::AppResult;
use opshub_core::traits::account::{AccountClient, AccountResolver};
use opshub_core::types::id::{AccountId, CronjobId, RecordId};
use opshub_database::repositories::RecordRepository;
use opshub_entity::cronjob::Cronjob;
use opshub_entity::record::Record;

use crate::logfile;

/// Map of resolvable backup accounts, keyed by account id. The `BTreeMap`
/// ordering doubles as the lock-acquisition order.
pub type AccountMap = BTreeMap<AccountId, Arc<dyn AccountClient>>;

/// Trims stale artifacts and cleans execution records.
pub struct RetentionManager {
    records: Arc<RecordRepository>,
    accounts: Arc<dyn AccountResolver>,
    locks: DashMap<(CronjobId, AccountId), Arc<Mutex<()>>>,
}

impl fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionManager").finish()
    }
}

impl RetentionManager {
    /// Create a new retention manager.
    pub fn new(records: Arc<RecordRepository>, accounts: Arc<dyn AccountResolver>) -> Self {
        Self {
            records,
            accounts,
            locks: DashMap::new(),
        }
    }

    /// Trim a job's artifacts down to `retain_copies` surviving records,
    /// newest first. `retain_copies == 0` disables trimming entirely.
    /// `exclude` protects the record just written by the triggering run
    /// from being swept by its own pass.
    pub async fn remove_expired(
        &self,
        job: &Cronjob,
        accounts: &AccountMap,
        exclude: Option<RecordId>,
    ) -> AppResult<()> {
        if job.retain_copies <= 0 {
            return Ok(());
        }
        self.trim_to(job, job.retain_copies as usize, accounts, exclude)
            .await
    }

    /// Clean a job's records and artifacts.
    ///
    /// `clean_data` deletes every surviving backup artifact, restricted to
    /// local accounts unless `clean_remote_data` is also set. `is_delete`
    /// preserves backup audit history: artifact-bearing records are
    /// detached from the job instead of deleted. Remaining attached
    /// records always lose their on-disk log files.
    pub async fn clean_record(
        &self,
        job: &Cronjob,
        clean_data: bool,
        clean_remote_data: bool,
        is_delete: bool,
    ) -> AppResult<()> {
        if clean_data && job.job_type.has_backup() {
            let mut accounts = self.resolve_accounts(job).await;
            if !clean_remote_data {
                accounts.retain(|_, client| client.is_local());
            }
            if !accounts.is_empty() {
                self.trim_to(job, 0, &accounts, None).await?;
            }
        }

        let remaining = self.records.list_by_job(job.id).await?;
        for record in &remaining {
            logfile::remove(record.log_path.as_deref()).await;
        }
        if is_delete {
            for record in &remaining {
                if record.artifact_path.is_some() {
                    if let Err(e) = self.records.detach(record.id).await {
                        warn!("Failed to detach record {}: {}", record.id, e);
                    }
                } else if let Err(e) = self.records.delete(record.id).await {
                    warn!("Failed to delete record {}: {}", record.id, e);
                }
            }
        } else {
            self.records.delete_by_job(job.id).await?;
        }
        Ok(())
    }

    /// Resolve a job's source accounts, skipping unavailable ones.
    pub async fn resolve_accounts(&self, job: &Cronjob) -> AccountMap {
        let mut map = AccountMap::new();
        for id in &job.source_account_ids {
            match self.accounts.client(*id).await {
                Ok(client) => {
                    map.insert(*id, client);
                }
                Err(e) => warn!(
                    "Backup account {} unavailable for cron job '{}': {}",
                    id, job.name, e
                ),
            }
        }
        map
    }

    async fn trim_to(
        &self,
        job: &Cronjob,
        keep: usize,
        accounts: &AccountMap,
        exclude: Option<RecordId>,
    ) -> AppResult<()> {
        let _guards = self.lock_pairs(job.id, accounts).await;

        // Newest-first; the triggering run's own record sits at the head,
        // inside the kept window. `exclude` is filtered after the skip so
        // a racing run's fresh artifact beyond the window still survives.
        let records = self.records.list_backups_by_job(job.id).await?;
        let stale: Vec<&Record> = records
            .iter()
            .skip(keep)
            .filter(|record| exclude != Some(record.id))
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        debug!(
            "Trimming {} stale artifact(s) of cron job '{}' (keep {})",
            stale.len(),
            job.name,
            keep
        );

        // oldest first
        for record in stale.into_iter().rev() {
            let Some(artifact) = record.artifact_path.as_deref() else {
                continue;
            };
            // A failing delete on one account must not block cleanup on
            // the others.
            for client in accounts.values() {
                if let Err(e) = client.delete(artifact).await {
                    warn!(
                        "Failed to delete artifact '{}' on account '{}': {}",
                        artifact,
                        client.name(),
                        e
                    );
                }
            }
            logfile::remove(record.log_path.as_deref()).await;
            if let Err(e) = self.records.delete(record.id).await {
                warn!("Failed to delete record {}: {}", record.id, e);
            }
        }
        Ok(())
    }

    async fn lock_pairs(
        &self,
        job: CronjobId,
        accounts: &AccountMap,
    ) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(accounts.len());
        for &account in accounts.keys() {
            let lock = self
                .locks
                .entry((job, account))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}
