//! # opshub-entity
//!
//! Domain entity models for the OpsHub cron core. Every struct in this
//! crate represents a database table row or a domain value object. All
//! entities derive `Debug`, `Clone`, `Serialize`, and `Deserialize`.

pub mod alert;
pub mod cronjob;
pub mod record;
pub mod transfer;
