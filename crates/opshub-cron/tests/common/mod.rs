//! Shared test harness: scratch database, manual clock, and fake
//! collaborators implementing the core contracts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use opshub_core::error::AppError;
use opshub_core::result::AppResult;
use opshub_core::traits::account::{AccountClient, AccountResolver};
use opshub_core::traits::resolver::SourceResolver;
use opshub_core::types::id::{AccountId, CronjobId, SourceId};
use opshub_database::connection::DatabasePool;
use opshub_database::migration::run_migrations;
use opshub_database::repositories::{CronjobRepository, RecordRepository, RecordSearch};
use opshub_entity::alert::AlertSubscription;
use opshub_entity::cronjob::{CronjobOperate, JobType, SourceSelector};
use opshub_entity::record::{Record, RecordStatus};

use opshub_cron::alert::AlertBridge;
use opshub_cron::engine::{Clock, CronEngine, ManualClock};
use opshub_cron::registry::CronjobService;
use opshub_cron::retention::RetentionManager;
use opshub_cron::runner::{ActionInvoker, ActionOutput, JobRunner};

/// Backup account fake that records deletions and mirrors them on disk.
#[derive(Debug)]
pub struct FakeAccountClient {
    name: String,
    local: bool,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeAccountClient {
    fn new(name: &str, local: bool) -> Self {
        Self {
            name: name.to_string(),
            local,
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountClient for FakeAccountClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        self.local
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.deleted.lock().unwrap().push(path.to_string());
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(AppError::storage(format!("delete '{path}' failed: {e}")));
            }
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> AppResult<()> {
        tokio::fs::copy(local, remote).await?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> AppResult<()> {
        tokio::fs::copy(remote, local).await?;
        Ok(())
    }
}

/// Account registry fake: account 1 is `local`, account 2 is `offsite`.
#[derive(Debug)]
pub struct FakeAccounts {
    clients: HashMap<AccountId, Arc<FakeAccountClient>>,
}

impl FakeAccounts {
    pub fn new() -> Self {
        let mut clients = HashMap::new();
        clients.insert(
            AccountId::from_raw(1),
            Arc::new(FakeAccountClient::new("local", true)),
        );
        clients.insert(
            AccountId::from_raw(2),
            Arc::new(FakeAccountClient::new("offsite", false)),
        );
        Self { clients }
    }

    pub fn handle(&self, id: i64) -> Arc<FakeAccountClient> {
        Arc::clone(&self.clients[&AccountId::from_raw(id)])
    }
}

#[async_trait]
impl AccountResolver for FakeAccounts {
    async fn client(&self, id: AccountId) -> AppResult<Arc<dyn AccountClient>> {
        self.clients
            .get(&id)
            .map(|client| Arc::clone(client) as Arc<dyn AccountClient>)
            .ok_or_else(|| AppError::resolution(format!("account {id} not found")))
    }

    async fn name_of(&self, id: AccountId) -> AppResult<String> {
        self.clients
            .get(&id)
            .map(|client| client.name.clone())
            .ok_or_else(|| AppError::resolution(format!("account {id} not found")))
    }

    async fn id_of(&self, name: &str) -> AppResult<AccountId> {
        self.clients
            .iter()
            .find(|(_, client)| client.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| AppError::resolution(format!("account '{name}' not found")))
    }

    async fn local(&self) -> AppResult<Option<AccountId>> {
        Ok(self
            .clients
            .iter()
            .find(|(_, client)| client.local)
            .map(|(id, _)| *id))
    }
}

/// Name registry fake for one source kind.
#[derive(Debug)]
pub struct FakeSources {
    names: HashMap<i64, String>,
}

impl FakeSources {
    pub fn new(entries: &[(i64, &str)]) -> Self {
        Self {
            names: entries
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl SourceResolver for FakeSources {
    async fn name_of(&self, id: SourceId) -> AppResult<String> {
        self.names
            .get(&id.into_raw())
            .cloned()
            .ok_or_else(|| AppError::resolution(format!("source {id} not found")))
    }

    async fn id_of(&self, name: &str) -> AppResult<SourceId> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| SourceId::from_raw(*id))
            .ok_or_else(|| AppError::resolution(format!("source '{name}' not found")))
    }
}

/// Alert bridge fake recording subscriptions and notifications.
#[derive(Debug, Default)]
pub struct FakeAlerts {
    pub subs: Mutex<HashMap<(JobType, CronjobId), AlertSubscription>>,
    pub notified: Mutex<Vec<(CronjobId, RecordStatus)>>,
}

impl FakeAlerts {
    pub fn notifications(&self) -> Vec<(CronjobId, RecordStatus)> {
        self.notified.lock().unwrap().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertBridge for FakeAlerts {
    async fn subscription(
        &self,
        job_type: JobType,
        id: CronjobId,
    ) -> AppResult<Option<AlertSubscription>> {
        Ok(self.subs.lock().unwrap().get(&(job_type, id)).cloned())
    }

    async fn create(&self, subscription: AlertSubscription) -> AppResult<()> {
        self.subs.lock().unwrap().insert(
            (subscription.job_type, subscription.cronjob_id),
            subscription,
        );
        Ok(())
    }

    async fn update(&self, subscription: AlertSubscription) -> AppResult<()> {
        self.create(subscription).await
    }

    async fn remove(&self, job_type: JobType, id: CronjobId) -> AppResult<()> {
        self.subs.lock().unwrap().remove(&(job_type, id));
        Ok(())
    }

    async fn notify(&self, subscription: &AlertSubscription, record: &Record) -> AppResult<()> {
        self.notified
            .lock()
            .unwrap()
            .push((subscription.cronjob_id, record.status));
        Ok(())
    }
}

/// Scripted action driver: fails the first `fail_first` invocations, then
/// writes a fresh artifact file per call.
#[derive(Debug)]
pub struct FakeInvoker {
    artifact_dir: PathBuf,
    calls: AtomicUsize,
    fail_first: AtomicUsize,
}

impl FakeInvoker {
    pub fn new(artifact_dir: PathBuf) -> Self {
        Self {
            artifact_dir,
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        }
    }

    pub fn fail_first(&self, count: usize) {
        self.fail_first.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionInvoker for FakeInvoker {
    async fn invoke(&self, job: &opshub_entity::cronjob::Cronjob) -> AppResult<ActionOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first.load(Ordering::SeqCst) {
            return Err(AppError::execution(format!(
                "scripted failure on attempt {call}"
            )));
        }
        let path = self
            .artifact_dir
            .join(format!("{}-backup-{call}.tgz", job.name));
        tokio::fs::write(&path, b"artifact").await?;
        Ok(ActionOutput {
            artifacts: vec![path.display().to_string()],
            from_local: true,
        })
    }
}

/// Fully wired service over a scratch database and fakes.
pub struct TestEnv {
    pub service: CronjobService,
    pub engine: Arc<CronEngine>,
    pub clock: Arc<ManualClock>,
    pub jobs: Arc<CronjobRepository>,
    pub records: Arc<RecordRepository>,
    pub accounts: Arc<FakeAccounts>,
    pub alerts: Arc<FakeAlerts>,
    pub invoker: Arc<FakeInvoker>,
    pub data_dir: PathBuf,
    pub artifact_dir: PathBuf,
    _dir: TempDir,
}

pub async fn setup() -> TestEnv {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let artifact_dir = dir.path().join("artifacts");
    tokio::fs::create_dir_all(&artifact_dir).await.unwrap();

    let db = DatabasePool::from_path(&dir.path().join("opshub.db"))
        .await
        .unwrap();
    run_migrations(db.pool()).await.unwrap();
    let pool = db.into_pool();

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let engine = Arc::new(CronEngine::new(Arc::clone(&clock) as Arc<dyn Clock>));

    let jobs = Arc::new(CronjobRepository::new(pool.clone()));
    let records = Arc::new(RecordRepository::new(pool));
    let accounts = Arc::new(FakeAccounts::new());
    let alerts = Arc::new(FakeAlerts::default());
    let invoker = Arc::new(FakeInvoker::new(artifact_dir.clone()));

    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&records),
        Arc::clone(&accounts) as Arc<dyn AccountResolver>,
    ));
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&jobs),
        Arc::clone(&records),
        Arc::clone(&retention),
        Arc::clone(&alerts) as Arc<dyn AlertBridge>,
        Arc::clone(&invoker) as Arc<dyn ActionInvoker>,
        data_dir.clone(),
    ));

    let service = CronjobService::new(
        Arc::clone(&jobs),
        Arc::clone(&records),
        Arc::clone(&engine),
        runner,
        retention,
        Arc::clone(&accounts) as Arc<dyn AccountResolver>,
        Arc::new(FakeSources::new(&[(10, "wiki"), (11, "forum")])),
        Arc::new(FakeSources::new(&[(1, "blog"), (2, "shop")])),
        Arc::new(FakeSources::new(&[(20, "appdb"), (21, "metrics")])),
        Arc::clone(&alerts) as Arc<dyn AlertBridge>,
        data_dir.clone(),
    );

    TestEnv {
        service,
        engine,
        clock,
        jobs,
        records,
        accounts,
        alerts,
        invoker,
        data_dir,
        artifact_dir,
        _dir: dir,
    }
}

/// Minimal create/update payload.
pub fn operate(name: &str, job_type: JobType, spec: &str) -> CronjobOperate {
    CronjobOperate {
        name: name.to_string(),
        job_type,
        spec: spec.to_string(),
        executor: String::new(),
        command: String::new(),
        script: String::new(),
        sources: SourceSelector::All,
        source_account_ids: vec![AccountId::from_raw(1)],
        download_account_id: Some(AccountId::from_raw(1)),
        retain_copies: 0,
        retry_times: 0,
        timeout_seconds: 300,
        ignore_err: false,
        secret: String::new(),
        snapshot_rule: None,
        alert: None,
    }
}

/// Wait until the invoker has been called `calls` times and no record is
/// still running.
pub async fn drain(env: &TestEnv, calls: usize) {
    for _ in 0..1000 {
        if env.invoker.calls() >= calls {
            let (running, _) = env
                .records
                .page(&RecordSearch {
                    status: Some(RecordStatus::Running),
                    ..Default::default()
                })
                .await
                .unwrap();
            if running == 0 {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {calls} invocation(s) to finish");
}

/// Count artifact files currently on disk.
pub fn artifact_count(env: &TestEnv) -> usize {
    std::fs::read_dir(&env.artifact_dir).unwrap().count()
}
