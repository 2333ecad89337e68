//! Stand-alone collaborator defaults for the agent binary.
//!
//! These keep the agent runnable without the wider platform: a
//! filesystem-backed backup account, an offline source registry, an
//! alert bridge that only logs, and a shell action driver. A platform
//! deployment wires its own implementations instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use opshub_core::error::{AppError, ErrorKind};
use opshub_core::result::AppResult;
use opshub_core::traits::account::{AccountClient, AccountResolver};
use opshub_core::traits::resolver::SourceResolver;
use opshub_core::types::id::{AccountId, CronjobId, SourceId};
use opshub_cron::alert::AlertBridge;
use opshub_cron::runner::{ActionInvoker, ActionOutput};
use opshub_entity::alert::AlertSubscription;
use opshub_entity::cronjob::{Cronjob, JobType};
use opshub_entity::record::{Record, RecordStatus};

/// Filesystem-backed backup account.
#[derive(Debug, Clone)]
pub struct LocalAccountClient {
    root: PathBuf,
}

impl LocalAccountClient {
    /// Resolve an artifact path: absolute paths are used as-is, relative
    /// ones land under the account root.
    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl AccountClient for LocalAccountClient {
    fn name(&self) -> &str {
        "local"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let full_path = self.resolve(path);
        if let Err(e) = fs::remove_file(&full_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete artifact: {}", full_path.display()),
                    e,
                ));
            }
        }
        debug!(path, "Deleted artifact");
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> AppResult<()> {
        let target = self.resolve(remote);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local, &target).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to store artifact: {}", target.display()),
                e,
            )
        })?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> AppResult<()> {
        let source = self.resolve(remote);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, local).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to fetch artifact: {}", source.display()),
                e,
            )
        })?;
        Ok(())
    }
}

/// Account registry with a single local destination.
#[derive(Debug)]
pub struct LocalAccounts {
    id: AccountId,
    client: Arc<LocalAccountClient>,
}

impl LocalAccounts {
    /// Create the registry, ensuring the backup root exists.
    pub async fn new(root: PathBuf) -> AppResult<Self> {
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create backup root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            id: AccountId::from_raw(1),
            client: Arc::new(LocalAccountClient { root }),
        })
    }
}

#[async_trait]
impl AccountResolver for LocalAccounts {
    async fn client(&self, id: AccountId) -> AppResult<Arc<dyn AccountClient>> {
        if id == self.id {
            Ok(Arc::clone(&self.client) as Arc<dyn AccountClient>)
        } else {
            Err(AppError::resolution(format!("backup account {id} not found")))
        }
    }

    async fn name_of(&self, id: AccountId) -> AppResult<String> {
        if id == self.id {
            Ok("local".to_string())
        } else {
            Err(AppError::resolution(format!("backup account {id} not found")))
        }
    }

    async fn id_of(&self, name: &str) -> AppResult<AccountId> {
        if name == "local" {
            Ok(self.id)
        } else {
            Err(AppError::resolution(format!(
                "backup account '{name}' not found"
            )))
        }
    }

    async fn local(&self) -> AppResult<Option<AccountId>> {
        Ok(Some(self.id))
    }
}

/// Source registry placeholder for stand-alone operation. Every lookup
/// fails with a resolution error, which import handles by marking jobs
/// pending.
#[derive(Debug)]
pub struct OfflineSources {
    kind: &'static str,
}

impl OfflineSources {
    /// Create a placeholder registry for one source kind.
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl SourceResolver for OfflineSources {
    async fn name_of(&self, id: SourceId) -> AppResult<String> {
        Err(AppError::resolution(format!(
            "{} registry not connected (id {id})",
            self.kind
        )))
    }

    async fn id_of(&self, name: &str) -> AppResult<SourceId> {
        Err(AppError::resolution(format!(
            "{} registry not connected (name '{name}')",
            self.kind
        )))
    }
}

/// Alert bridge that keeps subscriptions in memory and logs outcomes.
#[derive(Debug, Default)]
pub struct LogAlertBridge {
    subs: Mutex<HashMap<(JobType, CronjobId), AlertSubscription>>,
}

#[async_trait]
impl AlertBridge for LogAlertBridge {
    async fn subscription(
        &self,
        job_type: JobType,
        id: CronjobId,
    ) -> AppResult<Option<AlertSubscription>> {
        Ok(self.subs.lock().await.get(&(job_type, id)).cloned())
    }

    async fn create(&self, subscription: AlertSubscription) -> AppResult<()> {
        self.subs.lock().await.insert(
            (subscription.job_type, subscription.cronjob_id),
            subscription,
        );
        Ok(())
    }

    async fn update(&self, subscription: AlertSubscription) -> AppResult<()> {
        self.create(subscription).await
    }

    async fn remove(&self, job_type: JobType, id: CronjobId) -> AppResult<()> {
        self.subs.lock().await.remove(&(job_type, id));
        Ok(())
    }

    async fn notify(&self, subscription: &AlertSubscription, record: &Record) -> AppResult<()> {
        match record.status {
            RecordStatus::Failed => warn!(
                alert = %subscription.title,
                "Cron job {} failed: {}",
                subscription.cronjob_id,
                record.message.as_deref().unwrap_or("unknown error")
            ),
            _ => info!(
                alert = %subscription.title,
                "Cron job {} completed",
                subscription.cronjob_id
            ),
        }
        Ok(())
    }
}

/// Shell action driver: runs `sh -c` under the job's timeout. Other job
/// types need their platform drivers and fail with an execution error.
#[derive(Debug, Clone, Copy)]
pub struct ShellInvoker;

impl ShellInvoker {
    fn command_line(job: &Cronjob) -> AppResult<String> {
        if !job.command.is_empty() {
            return Ok(job.command.clone());
        }
        if !job.script.is_empty() {
            return Ok(job.script.clone());
        }
        Err(AppError::execution(format!(
            "shell job '{}' has no command or script",
            job.name
        )))
    }
}

#[async_trait]
impl ActionInvoker for ShellInvoker {
    async fn invoke(&self, job: &Cronjob) -> AppResult<ActionOutput> {
        if job.job_type != JobType::Shell {
            return Err(AppError::execution(format!(
                "no driver installed for {} jobs",
                job.job_type
            )));
        }

        let command_line = Self::command_line(job)?;
        let timeout = if job.timeout_seconds > 0 {
            Duration::from_secs(job.timeout_seconds as u64)
        } else {
            Duration::from_secs(3600)
        };

        let output = tokio::time::timeout(
            timeout,
            Command::new("sh").arg("-c").arg(&command_line).output(),
        )
        .await
        .map_err(|_| {
            AppError::execution(format!(
                "command timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| {
            AppError::with_source(ErrorKind::Execution, "failed to spawn command", e)
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::execution(format!(
                "command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(ActionOutput {
            artifacts: Vec::new(),
            from_local: true,
        })
    }
}
