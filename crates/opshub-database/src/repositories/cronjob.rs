//! Cron job repository implementation.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use opshub_core::error::{AppError, ErrorKind};
use opshub_core::result::AppResult;
use opshub_core::types::id::{AccountId, CronjobId, EntryId};
use opshub_core::types::pagination::PageRequest;
use opshub_core::types::sorting::SortDirection;
use opshub_entity::cronjob::{Cronjob, JobStatus, JobType, SourceSelector};

/// Search parameters for the paged job listing.
#[derive(Debug, Clone, Default)]
pub struct CronjobSearch {
    /// Name substring filter.
    pub info: Option<String>,
    /// Sort field: `name`, `status`, `job_type`, or `created_at`.
    pub order_by: Option<String>,
    /// Sort direction.
    pub order: SortDirection,
    /// Page window.
    pub page: PageRequest,
}

/// Internal row type: JSON-shaped columns come back as TEXT.
#[derive(FromRow)]
struct CronjobRow {
    id: i64,
    name: String,
    job_type: JobType,
    spec: String,
    status: JobStatus,
    executor: String,
    command: String,
    script: String,
    sources_json: String,
    source_account_ids_json: String,
    download_account_id: Option<i64>,
    retain_copies: i64,
    retry_times: i64,
    timeout_seconds: i64,
    ignore_err: bool,
    secret: String,
    snapshot_rule_json: Option<String>,
    entry_ids_json: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CronjobRow> for Cronjob {
    type Error = AppError;

    fn try_from(row: CronjobRow) -> AppResult<Self> {
        let sources: SourceSelector = serde_json::from_str(&row.sources_json)?;
        let source_account_ids: Vec<AccountId> =
            serde_json::from_str(&row.source_account_ids_json)?;
        let entry_ids: Vec<EntryId> = serde_json::from_str(&row.entry_ids_json)?;
        let snapshot_rule = match row.snapshot_rule_json.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        Ok(Cronjob {
            id: CronjobId::from_raw(row.id),
            name: row.name,
            job_type: row.job_type,
            spec: row.spec,
            status: row.status,
            executor: row.executor,
            command: row.command,
            script: row.script,
            sources,
            source_account_ids,
            download_account_id: row.download_account_id.map(AccountId::from_raw),
            retain_copies: row.retain_copies,
            retry_times: row.retry_times,
            timeout_seconds: row.timeout_seconds,
            ignore_err: row.ignore_err,
            secret: row.secret,
            snapshot_rule,
            entry_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for cron job CRUD and listing.
#[derive(Debug, Clone)]
pub struct CronjobRepository {
    pool: SqlitePool,
}

impl CronjobRepository {
    /// Create a new cron job repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new job and return the stored row. The id on `job` is
    /// ignored; the database assigns one.
    pub async fn create(&self, job: &Cronjob) -> AppResult<Cronjob> {
        let row = sqlx::query_as::<_, CronjobRow>(
            "INSERT INTO cronjobs (name, job_type, spec, status, executor, command, script, \
             sources_json, source_account_ids_json, download_account_id, retain_copies, \
             retry_times, timeout_seconds, ignore_err, secret, snapshot_rule_json, \
             entry_ids_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&job.name)
        .bind(job.job_type)
        .bind(&job.spec)
        .bind(job.status)
        .bind(&job.executor)
        .bind(&job.command)
        .bind(&job.script)
        .bind(serde_json::to_string(&job.sources)?)
        .bind(serde_json::to_string(&job.source_account_ids)?)
        .bind(job.download_account_id.map(AccountId::into_raw))
        .bind(job.retain_copies)
        .bind(job.retry_times)
        .bind(job.timeout_seconds)
        .bind(job.ignore_err)
        .bind(&job.secret)
        .bind(
            job.snapshot_rule
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(serde_json::to_string(&job.entry_ids)?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create cron job", e))?;

        row.try_into()
    }

    /// Find a job by id.
    pub async fn find_by_id(&self, id: CronjobId) -> AppResult<Option<Cronjob>> {
        let row = sqlx::query_as::<_, CronjobRow>("SELECT * FROM cronjobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find cron job", e))?;

        row.map(Cronjob::try_from).transpose()
    }

    /// Find a job by its unique name.
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Cronjob>> {
        let row = sqlx::query_as::<_, CronjobRow>("SELECT * FROM cronjobs WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find cron job", e))?;

        row.map(Cronjob::try_from).transpose()
    }

    /// List jobs by an explicit id set, in id order.
    pub async fn list_by_ids(&self, ids: &[CronjobId]) -> AppResult<Vec<Cronjob>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("SELECT * FROM cronjobs WHERE id IN ({placeholders}) ORDER BY id ASC");

        let mut query = sqlx::query_as::<_, CronjobRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list cron jobs", e))?;

        rows.into_iter().map(Cronjob::try_from).collect()
    }

    /// List all jobs with the given status.
    pub async fn list_by_status(&self, status: JobStatus) -> AppResult<Vec<Cronjob>> {
        let rows = sqlx::query_as::<_, CronjobRow>(
            "SELECT * FROM cronjobs WHERE status = ? ORDER BY id ASC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list cron jobs", e))?;

        rows.into_iter().map(Cronjob::try_from).collect()
    }

    /// Update every mutable field of a job.
    pub async fn update(&self, job: &Cronjob) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE cronjobs SET name = ?, spec = ?, status = ?, executor = ?, command = ?, \
             script = ?, sources_json = ?, source_account_ids_json = ?, download_account_id = ?, \
             retain_copies = ?, retry_times = ?, timeout_seconds = ?, ignore_err = ?, secret = ?, \
             snapshot_rule_json = ?, entry_ids_json = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&job.name)
        .bind(&job.spec)
        .bind(job.status)
        .bind(&job.executor)
        .bind(&job.command)
        .bind(&job.script)
        .bind(serde_json::to_string(&job.sources)?)
        .bind(serde_json::to_string(&job.source_account_ids)?)
        .bind(job.download_account_id.map(AccountId::into_raw))
        .bind(job.retain_copies)
        .bind(job.retry_times)
        .bind(job.timeout_seconds)
        .bind(job.ignore_err)
        .bind(&job.secret)
        .bind(
            job.snapshot_rule
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(serde_json::to_string(&job.entry_ids)?)
        .bind(Utc::now())
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update cron job", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("cron job {} not found", job.id)));
        }
        Ok(())
    }

    /// Persist a job's live entry handle set.
    pub async fn update_entries(&self, id: CronjobId, entries: &[EntryId]) -> AppResult<()> {
        sqlx::query("UPDATE cronjobs SET entry_ids_json = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(entries)?)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update entry handles", e)
            })?;
        Ok(())
    }

    /// Persist a job's status together with its entry handle set.
    pub async fn update_status_entries(
        &self,
        id: CronjobId,
        status: JobStatus,
        entries: &[EntryId],
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE cronjobs SET status = ?, entry_ids_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(serde_json::to_string(entries)?)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update status", e))?;
        Ok(())
    }

    /// Delete a job row. Returns `true` if a row was deleted.
    pub async fn delete(&self, id: CronjobId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cronjobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete cron job", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    /// Page through jobs with an optional name filter and caller-selected
    /// ordering.
    pub async fn page(&self, search: &CronjobSearch) -> AppResult<(u64, Vec<Cronjob>)> {
        let pattern = search.info.as_ref().map(|info| format!("%{info}%"));

        let mut count_sql = String::from("SELECT COUNT(*) FROM cronjobs");
        if pattern.is_some() {
            count_sql.push_str(" WHERE name LIKE ?");
        }
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count cron jobs", e))?;

        let column = match search.order_by.as_deref() {
            Some("name") => "name",
            Some("status") => "status",
            Some("job_type") => "job_type",
            _ => "created_at",
        };
        let mut sql = String::from("SELECT * FROM cronjobs");
        if pattern.is_some() {
            sql.push_str(" WHERE name LIKE ?");
        }
        sql.push_str(&format!(
            " ORDER BY {column} {}, id ASC LIMIT ? OFFSET ?",
            search.order.as_sql()
        ));

        let mut query = sqlx::query_as::<_, CronjobRow>(&sql);
        if let Some(pattern) = &pattern {
            query = query.bind(pattern);
        }
        let rows = query
            .bind(search.page.limit() as i64)
            .bind(search.page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list cron jobs", e))?;

        let jobs = rows
            .into_iter()
            .map(Cronjob::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((total as u64, jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabasePool;
    use crate::migration::run_migrations;
    use tempfile::TempDir;

    fn sample_job(name: &str) -> Cronjob {
        let now = Utc::now();
        Cronjob {
            id: CronjobId::from_raw(0),
            name: name.to_string(),
            job_type: JobType::Database,
            spec: "0 2 * * *".to_string(),
            status: JobStatus::Enable,
            executor: String::new(),
            command: String::new(),
            script: String::new(),
            sources: SourceSelector::All,
            source_account_ids: vec![AccountId::from_raw(1)],
            download_account_id: Some(AccountId::from_raw(1)),
            retain_copies: 3,
            retry_times: 0,
            timeout_seconds: 300,
            ignore_err: false,
            secret: String::new(),
            snapshot_rule: None,
            entry_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn test_pool(dir: &TempDir) -> SqlitePool {
        let db = DatabasePool::from_path(&dir.path().join("test.db"))
            .await
            .unwrap();
        run_migrations(db.pool()).await.unwrap();
        db.into_pool()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let dir = TempDir::new().unwrap();
        let repo = CronjobRepository::new(test_pool(&dir).await);

        let created = repo.create(&sample_job("nightly-db")).await.unwrap();
        assert!(created.id.into_raw() > 0);

        let by_id = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "nightly-db");
        assert_eq!(by_id.sources, SourceSelector::All);

        let by_name = repo.find_by_name("nightly-db").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        assert!(repo.find_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_roundtrips_json_fields() {
        let dir = TempDir::new().unwrap();
        let repo = CronjobRepository::new(test_pool(&dir).await);

        let mut job = repo.create(&sample_job("weekly-app")).await.unwrap();
        job.sources =
            SourceSelector::ByIds(vec![opshub_core::types::id::SourceId::from_raw(4)]);
        job.entry_ids = vec![EntryId::new(), EntryId::new()];
        job.status = JobStatus::Disable;
        repo.update(&job).await.unwrap();

        let stored = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.sources, job.sources);
        assert_eq!(stored.entry_ids, job.entry_ids);
        assert_eq!(stored.status, JobStatus::Disable);
    }

    #[tokio::test]
    async fn test_page_filters_by_name() {
        let dir = TempDir::new().unwrap();
        let repo = CronjobRepository::new(test_pool(&dir).await);

        repo.create(&sample_job("nightly-db")).await.unwrap();
        repo.create(&sample_job("nightly-web")).await.unwrap();
        repo.create(&sample_job("hourly-logs")).await.unwrap();

        let (total, jobs) = repo
            .page(&CronjobSearch {
                info: Some("nightly".to_string()),
                order_by: Some("name".to_string()),
                order: SortDirection::Asc,
                page: PageRequest::default(),
            })
            .await
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(jobs[0].name, "nightly-db");
        assert_eq!(jobs[1].name, "nightly-web");
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let repo = CronjobRepository::new(test_pool(&dir).await);

        let job = repo.create(&sample_job("to-delete")).await.unwrap();
        assert!(repo.delete(job.id).await.unwrap());
        assert!(!repo.delete(job.id).await.unwrap());
        assert!(repo.find_by_id(job.id).await.unwrap().is_none());
    }
}
