//! Runner and retention behavior: retries, alert escalation, artifact
//! trimming, and the scheduled end-to-end lifecycle.

mod common;

use chrono::{Duration, TimeZone, Utc};

use common::{artifact_count, drain, operate, setup};
use opshub_core::types::id::AccountId;
use opshub_entity::alert::AlertConfig;
use opshub_entity::cronjob::{JobStatus, JobType};
use opshub_entity::record::{NewRecord, RecordStatus};

#[tokio::test]
async fn test_runner_retries_until_success() {
    let env = setup().await;
    env.invoker.fail_first(2);

    let mut req = operate("retry-db", JobType::Database, "0 2 * * *");
    req.retry_times = 2;
    let job = env.service.create(req).await.unwrap();

    env.service.handle_once(job.id).await.unwrap();

    assert_eq!(env.invoker.calls(), 3);
    let records = env.records.list_by_job(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Success);
    assert!(records[0].artifact_path.is_some());

    let log = env.service.load_record_log(records[0].id).await.unwrap();
    assert!(log.contains("attempt 1 failed"));
    assert!(log.contains("attempt 3 succeeded"));
}

#[tokio::test]
async fn test_runner_records_final_failure_and_escalates() {
    let env = setup().await;
    env.invoker.fail_first(usize::MAX);

    let mut req = operate("failing", JobType::Database, "0 2 * * *");
    req.retry_times = 1;
    req.alert = Some(AlertConfig {
        title: "backup failed".to_string(),
        send_count: 1,
        method: "mail".to_string(),
    });
    let job = env.service.create(req).await.unwrap();

    env.service.handle_once(job.id).await.unwrap();

    assert_eq!(env.invoker.calls(), 2);
    let records = env.records.list_by_job(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert!(records[0]
        .message
        .as_deref()
        .unwrap()
        .contains("scripted failure"));

    assert_eq!(
        env.alerts.notifications(),
        vec![(job.id, RecordStatus::Failed)]
    );
}

#[tokio::test]
async fn test_ignore_err_suppresses_failure_alert() {
    let env = setup().await;
    env.invoker.fail_first(usize::MAX);

    let mut req = operate("tolerated", JobType::Database, "0 2 * * *");
    req.ignore_err = true;
    req.alert = Some(AlertConfig {
        title: "backup failed".to_string(),
        send_count: 1,
        method: "mail".to_string(),
    });
    let job = env.service.create(req).await.unwrap();

    env.service.handle_once(job.id).await.unwrap();

    // recorded as failed, but never escalated
    let records = env.records.list_by_job(job.id).await.unwrap();
    assert_eq!(records[0].status, RecordStatus::Failed);
    assert!(env.alerts.notifications().is_empty());
}

#[tokio::test]
async fn test_success_outcome_is_reported_when_subscribed() {
    let env = setup().await;

    let mut req = operate("watched", JobType::Database, "0 2 * * *");
    req.alert = Some(AlertConfig {
        title: "backup status".to_string(),
        send_count: 1,
        method: "mail".to_string(),
    });
    let job = env.service.create(req).await.unwrap();

    env.service.handle_once(job.id).await.unwrap();
    assert_eq!(
        env.alerts.notifications(),
        vec![(job.id, RecordStatus::Success)]
    );
}

#[tokio::test]
async fn test_remove_expired_keeps_newest_two_of_five() {
    let env = setup().await;

    let mut req = operate("trimmed", JobType::Database, "0 2 * * *");
    req.retain_copies = 2;
    let job = env.service.create(req).await.unwrap();

    // five pre-existing artifacts, oldest first
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    let mut artifacts = Vec::new();
    for day in 0..5 {
        let path = env.artifact_dir.join(format!("seed-{day}.tgz"));
        tokio::fs::write(&path, b"artifact").await.unwrap();
        artifacts.push(path.display().to_string());
        env.records
            .append(&NewRecord {
                cronjob_id: Some(job.id),
                start_time: base + Duration::days(day),
                status: RecordStatus::Success,
                message: None,
                artifact_path: Some(artifacts[day as usize].clone()),
                log_path: None,
                from_local: true,
            })
            .await
            .unwrap();
    }

    let stored = env.jobs.find_by_id(job.id).await.unwrap().unwrap();
    let retention = opshub_cron::RetentionManager::new(
        env.records.clone(),
        env.accounts.clone() as std::sync::Arc<dyn opshub_core::traits::account::AccountResolver>,
    );
    let accounts = retention.resolve_accounts(&stored).await;
    retention
        .remove_expired(&stored, &accounts, None)
        .await
        .unwrap();

    // exactly the three oldest artifacts were deleted
    let deleted = env.accounts.handle(1).deleted_paths();
    assert_eq!(deleted, artifacts[..3].to_vec());

    let remaining = env.records.list_backups_by_job(job.id).await.unwrap();
    assert_eq!(remaining.len(), 2);
    let kept: Vec<&str> = remaining
        .iter()
        .map(|r| r.artifact_path.as_deref().unwrap())
        .collect();
    assert_eq!(kept, vec![artifacts[4].as_str(), artifacts[3].as_str()]);
    assert_eq!(artifact_count(&env), 2);
}

#[tokio::test]
async fn test_remove_expired_tiebreak_prefers_latest_insertion() {
    let env = setup().await;

    let mut req = operate("tied", JobType::Database, "0 2 * * *");
    req.retain_copies = 1;
    let job = env.service.create(req).await.unwrap();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    let mut ids = Vec::new();
    for n in 0..2 {
        let path = env.artifact_dir.join(format!("tied-{n}.tgz"));
        tokio::fs::write(&path, b"artifact").await.unwrap();
        let record = env
            .records
            .append(&NewRecord {
                cronjob_id: Some(job.id),
                start_time: start,
                status: RecordStatus::Success,
                message: None,
                artifact_path: Some(path.display().to_string()),
                log_path: None,
                from_local: true,
            })
            .await
            .unwrap();
        ids.push(record.id);
    }

    let stored = env.jobs.find_by_id(job.id).await.unwrap().unwrap();
    let retention = opshub_cron::RetentionManager::new(
        env.records.clone(),
        env.accounts.clone() as std::sync::Arc<dyn opshub_core::traits::account::AccountResolver>,
    );
    let accounts = retention.resolve_accounts(&stored).await;
    retention
        .remove_expired(&stored, &accounts, None)
        .await
        .unwrap();

    // identical timestamps: the most recently inserted row survives
    let remaining = env.records.list_backups_by_job(job.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ids[1]);
}

#[tokio::test]
async fn test_retain_copies_zero_disables_trimming() {
    let env = setup().await;

    let job = env
        .service
        .create(operate("untrimmed", JobType::Database, "0 2 * * *"))
        .await
        .unwrap();

    for _ in 0..4 {
        env.service.handle_once(job.id).await.unwrap();
    }

    assert_eq!(env.records.list_backups_by_job(job.id).await.unwrap().len(), 4);
    assert_eq!(artifact_count(&env), 4);
    assert!(env.accounts.handle(1).deleted_paths().is_empty());
}

#[tokio::test]
async fn test_clean_record_full_trim_spares_remote_without_flag() {
    let env = setup().await;

    let mut req = operate("cleanable", JobType::Database, "0 2 * * *");
    req.source_account_ids = vec![AccountId::from_raw(1), AccountId::from_raw(2)];
    let job = env.service.create(req).await.unwrap();

    env.service.handle_once(job.id).await.unwrap();
    env.service.handle_once(job.id).await.unwrap();

    let stored = env.jobs.find_by_id(job.id).await.unwrap().unwrap();
    let retention = opshub_cron::RetentionManager::new(
        env.records.clone(),
        env.accounts.clone() as std::sync::Arc<dyn opshub_core::traits::account::AccountResolver>,
    );
    retention
        .clean_record(&stored, true, false, false)
        .await
        .unwrap();

    // both artifacts deleted through the local account only
    assert_eq!(env.accounts.handle(1).deleted_paths().len(), 2);
    assert!(env.accounts.handle(2).deleted_paths().is_empty());
    assert!(env.records.list_by_job(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_end_to_end_nightly_database_backup() {
    let env = setup().await;

    let mut req = operate("nightly-db", JobType::Database, "0 2 * * *");
    req.retain_copies = 3;
    let job = env.service.create(req).await.unwrap();
    assert_eq!(job.entry_ids.len(), 1);

    // five scheduled firings, one per night at 02:00; each firing's own
    // retention pass settles before the next night starts
    for night in 1..=5u32 {
        env.clock
            .set(Utc.with_ymd_and_hms(2024, 1, night, 2, 0, 0).unwrap());
        env.engine.tick().await;
        drain(&env, night as usize).await;

        let expected = night.min(3) as usize;
        let mut settled = 0;
        for _ in 0..500 {
            settled = env.records.list_backups_by_job(job.id).await.unwrap().len();
            if settled == expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(settled, expected, "night {night}");
    }

    assert_eq!(env.invoker.calls(), 5);

    // exactly three artifacts and three records survive the fifth firing
    let records = env.records.list_backups_by_job(job.id).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == RecordStatus::Success));
    assert_eq!(artifact_count(&env), 3);

    // the two oldest artifacts were trimmed
    assert_eq!(env.accounts.handle(1).deleted_paths().len(), 2);

    // the job is still enabled and scheduled
    let stored = env.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Enable);
    assert_eq!(env.engine.entry_count().await, 1);
}

#[tokio::test]
async fn test_handle_once_ignores_schedule_and_status() {
    let env = setup().await;

    let job = env
        .service
        .create(operate("manual", JobType::Shell, "0 5 1 1 *"))
        .await
        .unwrap();
    env.service
        .update_status(job.id, JobStatus::Disable)
        .await
        .unwrap();

    env.service.handle_once(job.id).await.unwrap();

    let records = env.records.list_by_job(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Success);
}

#[tokio::test]
async fn test_download_record_resolves_local_artifact() {
    let env = setup().await;

    let job = env
        .service
        .create(operate("fetchable", JobType::Database, "0 2 * * *"))
        .await
        .unwrap();
    env.service.handle_once(job.id).await.unwrap();

    let record = &env.records.list_backups_by_job(job.id).await.unwrap()[0];
    let path = env
        .service
        .download_record(record.id, AccountId::from_raw(1))
        .await
        .unwrap();
    assert_eq!(path.display().to_string(), record.artifact_path.clone().unwrap());
    assert!(path.exists());

    let err = env
        .service
        .download_record(opshub_core::types::id::RecordId::from_raw(9999), AccountId::from_raw(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, opshub_core::error::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_overlapping_manual_runs_both_record() {
    let env = setup().await;

    let job = env
        .service
        .create(operate("overlap", JobType::Database, "0 2 * * *"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        env.service.handle_once(job.id),
        env.service.handle_once(job.id)
    );
    first.unwrap();
    second.unwrap();

    let records = env.records.list_by_job(job.id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == RecordStatus::Success));
}
