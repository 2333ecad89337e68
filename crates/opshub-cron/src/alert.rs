//! Alert bridge contract.
//!
//! Subscription storage, thresholds, and delivery live in the external
//! alert system; this core only keys subscriptions by (job type, job id),
//! keeps them in step with job lifecycle changes, and reports outcomes.

use async_trait::async_trait;

use opshub_core::result::AppResult;
use opshub_core::types::id::CronjobId;
use opshub_entity::alert::AlertSubscription;
use opshub_entity::cronjob::JobType;
use opshub_entity::record::Record;

/// External alert system notified of execution outcomes.
#[async_trait]
pub trait AlertBridge: Send + Sync + 'static {
    /// Fetch the subscription for a job, if one exists.
    async fn subscription(
        &self,
        job_type: JobType,
        id: CronjobId,
    ) -> AppResult<Option<AlertSubscription>>;

    /// Create a subscription.
    async fn create(&self, subscription: AlertSubscription) -> AppResult<()>;

    /// Replace a job's subscription settings.
    async fn update(&self, subscription: AlertSubscription) -> AppResult<()>;

    /// Remove a job's subscription. Absent subscriptions are a no-op.
    async fn remove(&self, job_type: JobType, id: CronjobId) -> AppResult<()>;

    /// Report one execution outcome. Threshold and delivery policy are the
    /// bridge's concern.
    async fn notify(&self, subscription: &AlertSubscription, record: &Record) -> AppResult<()>;
}
