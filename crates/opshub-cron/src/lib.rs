//! # opshub-cron
//!
//! The recurring-job orchestration core of OpsHub:
//! - Trigger spec grammar and firing-time computation
//! - A single-instance firing engine with an injectable clock
//! - The job registry that keeps the firing table consistent with the
//!   persisted job definitions and carries export/import
//! - A job runner with retry, outcome records, and alert reporting
//! - Retention trimming of stale backup artifacts

pub mod alert;
pub mod engine;
pub mod logfile;
pub mod registry;
pub mod retention;
pub mod runner;
pub mod spec;

pub use engine::{Clock, CronEngine, ManualClock, SystemClock};
pub use registry::CronjobService;
pub use retention::RetentionManager;
pub use runner::JobRunner;
