//! # opshub-core
//!
//! Core crate for the OpsHub cron core. Contains the collaborator trait
//! contracts, configuration schemas, typed identifiers, pagination/sorting
//! types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other OpsHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
