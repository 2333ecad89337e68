//! Repository implementations for the cron core's persisted entities.

pub mod cronjob;
pub mod record;

pub use cronjob::{CronjobRepository, CronjobSearch};
pub use record::{RecordRepository, RecordSearch};
