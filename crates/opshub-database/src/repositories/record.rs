//! Execution record repository implementation.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use opshub_core::error::{AppError, ErrorKind};
use opshub_core::result::AppResult;
use opshub_core::types::id::{CronjobId, RecordId};
use opshub_core::types::pagination::PageRequest;
use opshub_entity::record::{NewRecord, Record, RecordStatus};

/// Search parameters for the paged record listing.
#[derive(Debug, Clone, Default)]
pub struct RecordSearch {
    /// Restrict to one job.
    pub cronjob_id: Option<CronjobId>,
    /// Restrict to one outcome status.
    pub status: Option<RecordStatus>,
    /// Inclusive lower bound on start time.
    pub start_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on start time.
    pub start_to: Option<DateTime<Utc>>,
    /// Page window.
    pub page: PageRequest,
}

/// Repository for execution record persistence.
///
/// Listing order is pinned to `start_time DESC, id DESC`: identical start
/// times break ties by insertion order, newest row first. Retention counts
/// on this.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Create a new record repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a new execution record and return the stored row.
    pub async fn append(&self, record: &NewRecord) -> AppResult<Record> {
        sqlx::query_as::<_, Record>(
            "INSERT INTO records (cronjob_id, start_time, status, message, artifact_path, \
             log_path, from_local) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(record.cronjob_id)
        .bind(record.start_time)
        .bind(record.status)
        .bind(&record.message)
        .bind(&record.artifact_path)
        .bind(&record.log_path)
        .bind(record.from_local)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to append record", e))
    }

    /// Fetch a record by id.
    pub async fn find_by_id(&self, id: RecordId) -> AppResult<Option<Record>> {
        sqlx::query_as::<_, Record>("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find record", e))
    }

    /// The most recent record of a job, if any.
    pub async fn latest_by_job(&self, id: CronjobId) -> AppResult<Option<Record>> {
        sqlx::query_as::<_, Record>(
            "SELECT * FROM records WHERE cronjob_id = ? ORDER BY start_time DESC, id DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find latest record", e))
    }

    /// All records still attached to a job, newest first.
    pub async fn list_by_job(&self, id: CronjobId) -> AppResult<Vec<Record>> {
        sqlx::query_as::<_, Record>(
            "SELECT * FROM records WHERE cronjob_id = ? ORDER BY start_time DESC, id DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list records", e))
    }

    /// Artifact-bearing records still attached to a job, newest first.
    pub async fn list_backups_by_job(&self, id: CronjobId) -> AppResult<Vec<Record>> {
        sqlx::query_as::<_, Record>(
            "SELECT * FROM records WHERE cronjob_id = ? AND artifact_path IS NOT NULL \
             ORDER BY start_time DESC, id DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list backup records", e))
    }

    /// Finish a running record with its outcome.
    pub async fn mark_finished(
        &self,
        id: RecordId,
        status: RecordStatus,
        message: Option<&str>,
        artifact_path: Option<&str>,
        from_local: bool,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE records SET status = ?, message = ?, artifact_path = ?, from_local = ? \
             WHERE id = ?",
        )
        .bind(status)
        .bind(message)
        .bind(artifact_path)
        .bind(from_local)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to finish record", e))?;
        Ok(())
    }

    /// Detach a record from its job, keeping the row.
    pub async fn detach(&self, id: RecordId) -> AppResult<()> {
        sqlx::query("UPDATE records SET cronjob_id = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to detach record", e))?;
        Ok(())
    }

    /// Delete a record row.
    pub async fn delete(&self, id: RecordId) -> AppResult<()> {
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete record", e))?;
        Ok(())
    }

    /// Delete every record still attached to a job. Returns the number of
    /// deleted rows.
    pub async fn delete_by_job(&self, id: CronjobId) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE cronjob_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete records", e))?;
        Ok(result.rows_affected())
    }

    /// Page through records filtered by job, status, and start-time range.
    pub async fn page(&self, search: &RecordSearch) -> AppResult<(u64, Vec<Record>)> {
        let mut filter = String::new();
        if search.cronjob_id.is_some() {
            filter.push_str(" AND cronjob_id = ?");
        }
        if search.status.is_some() {
            filter.push_str(" AND status = ?");
        }
        if search.start_from.is_some() {
            filter.push_str(" AND start_time >= ?");
        }
        if search.start_to.is_some() {
            filter.push_str(" AND start_time <= ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM records WHERE 1=1{filter}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(id) = search.cronjob_id {
            count_query = count_query.bind(id);
        }
        if let Some(status) = search.status {
            count_query = count_query.bind(status);
        }
        if let Some(from) = search.start_from {
            count_query = count_query.bind(from);
        }
        if let Some(to) = search.start_to {
            count_query = count_query.bind(to);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count records", e))?;

        let sql = format!(
            "SELECT * FROM records WHERE 1=1{filter} \
             ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query_as::<_, Record>(&sql);
        if let Some(id) = search.cronjob_id {
            query = query.bind(id);
        }
        if let Some(status) = search.status {
            query = query.bind(status);
        }
        if let Some(from) = search.start_from {
            query = query.bind(from);
        }
        if let Some(to) = search.start_to {
            query = query.bind(to);
        }
        let records = query
            .bind(search.page.limit() as i64)
            .bind(search.page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list records", e))?;

        Ok((total as u64, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabasePool;
    use crate::migration::run_migrations;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn test_repo(dir: &TempDir) -> RecordRepository {
        let db = DatabasePool::from_path(&dir.path().join("test.db"))
            .await
            .unwrap();
        run_migrations(db.pool()).await.unwrap();
        RecordRepository::new(db.into_pool())
    }

    fn new_record(job: i64, start: DateTime<Utc>, artifact: Option<&str>) -> NewRecord {
        NewRecord {
            cronjob_id: Some(CronjobId::from_raw(job)),
            start_time: start,
            status: RecordStatus::Success,
            message: None,
            artifact_path: artifact.map(str::to_string),
            log_path: None,
            from_local: true,
        }
    }

    #[tokio::test]
    async fn test_list_by_job_is_newest_first_with_id_tiebreak() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir).await;

        let base = Utc::now();
        let old = repo
            .append(&new_record(1, base - Duration::hours(2), Some("a")))
            .await
            .unwrap();
        // Two records sharing the same start time.
        let tied_first = repo.append(&new_record(1, base, Some("b"))).await.unwrap();
        let tied_second = repo.append(&new_record(1, base, Some("c"))).await.unwrap();

        let listed = repo.list_by_job(CronjobId::from_raw(1)).await.unwrap();
        let ids: Vec<RecordId> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![tied_second.id, tied_first.id, old.id]);
    }

    #[tokio::test]
    async fn test_detach_hides_record_from_job_listing() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir).await;

        let record = repo
            .append(&new_record(7, Utc::now(), Some("artifact.tgz")))
            .await
            .unwrap();
        repo.detach(record.id).await.unwrap();

        assert!(repo.list_by_job(CronjobId::from_raw(7)).await.unwrap().is_empty());
        let kept = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(kept.cronjob_id, None);
        assert_eq!(kept.artifact_path.as_deref(), Some("artifact.tgz"));
    }

    #[tokio::test]
    async fn test_page_filters() {
        let dir = TempDir::new().unwrap();
        let repo = test_repo(&dir).await;

        let now = Utc::now();
        repo.append(&new_record(1, now, None)).await.unwrap();
        repo.append(&new_record(2, now, None)).await.unwrap();
        let mut failed = new_record(1, now - Duration::days(2), None);
        failed.status = RecordStatus::Failed;
        repo.append(&failed).await.unwrap();

        let (total, items) = repo
            .page(&RecordSearch {
                cronjob_id: Some(CronjobId::from_raw(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 2);

        let (total, _) = repo
            .page(&RecordSearch {
                cronjob_id: Some(CronjobId::from_raw(1)),
                status: Some(RecordStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);

        let (total, _) = repo
            .page(&RecordSearch {
                start_from: Some(now - Duration::days(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 2);
    }
}
