//! Idempotent schema migration for the embedded store.

use sqlx::SqlitePool;
use tracing::info;

use opshub_core::error::{AppError, ErrorKind};
use opshub_core::result::AppResult;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "cronjobs",
        r#"
        CREATE TABLE IF NOT EXISTS cronjobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            job_type TEXT NOT NULL,
            spec TEXT NOT NULL,
            status TEXT NOT NULL,
            executor TEXT NOT NULL DEFAULT '',
            command TEXT NOT NULL DEFAULT '',
            script TEXT NOT NULL DEFAULT '',
            sources_json TEXT NOT NULL DEFAULT '"all"',
            source_account_ids_json TEXT NOT NULL DEFAULT '[]',
            download_account_id INTEGER,
            retain_copies INTEGER NOT NULL DEFAULT 0,
            retry_times INTEGER NOT NULL DEFAULT 0,
            timeout_seconds INTEGER NOT NULL DEFAULT 0,
            ignore_err BOOLEAN NOT NULL DEFAULT FALSE,
            secret TEXT NOT NULL DEFAULT '',
            snapshot_rule_json TEXT,
            entry_ids_json TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    ),
    (
        "records",
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cronjob_id INTEGER,
            start_time TIMESTAMP NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            artifact_path TEXT,
            log_path TEXT,
            from_local BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    ),
    (
        "idx_cronjobs_name",
        "CREATE INDEX IF NOT EXISTS idx_cronjobs_name ON cronjobs(name)",
    ),
    (
        "idx_records_cronjob",
        "CREATE INDEX IF NOT EXISTS idx_records_cronjob ON records(cronjob_id)",
    ),
    (
        "idx_records_start_time",
        "CREATE INDEX IF NOT EXISTS idx_records_start_time ON records(start_time)",
    ),
];

/// Apply the schema. Every statement is idempotent, so this is safe to run
/// on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> AppResult<()> {
    for (name, sql) in STATEMENTS {
        sqlx::query(sql).execute(pool).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Migration failed ({name}): {e}"),
                e,
            )
        })?;
    }

    info!("Database schema up to date");
    Ok(())
}
