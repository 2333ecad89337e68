//! # opshub-database
//!
//! Embedded SQLite persistence for the OpsHub cron core: connection pool
//! management, schema migration, and the cron job / execution record
//! repositories.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
