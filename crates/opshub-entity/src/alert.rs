//! Alert subscription snapshot.
//!
//! Subscriptions are owned by the external alert system and referenced
//! here by (job type, job id). This core creates, updates, and removes
//! them through the alert bridge and embeds a snapshot in exports.

use serde::{Deserialize, Serialize};

use opshub_core::types::id::CronjobId;

use crate::cronjob::status::JobType;

/// A notification binding for one job's execution outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSubscription {
    /// Job type half of the subscription key.
    pub job_type: JobType,
    /// Job id half of the subscription key.
    pub cronjob_id: CronjobId,
    /// Alert title shown in notifications.
    pub title: String,
    /// Failure-count threshold before delivery.
    pub send_count: i64,
    /// Delivery method (owned by the alert system).
    pub method: String,
}

/// Alert settings carried by job create/update payloads and exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Alert title shown in notifications.
    pub title: String,
    /// Failure-count threshold before delivery.
    pub send_count: i64,
    /// Delivery method.
    pub method: String,
}

impl AlertConfig {
    /// Bind this configuration to a job, producing the subscription row.
    pub fn subscribe(&self, job_type: JobType, cronjob_id: CronjobId) -> AlertSubscription {
        AlertSubscription {
            job_type,
            cronjob_id,
            title: self.title.clone(),
            send_count: self.send_count,
            method: self.method.clone(),
        }
    }
}

impl From<&AlertSubscription> for AlertConfig {
    fn from(sub: &AlertSubscription) -> Self {
        Self {
            title: sub.title.clone(),
            send_count: sub.send_count,
            method: sub.method.clone(),
        }
    }
}
