//! Execution record entity.

pub mod model;
pub mod status;

pub use model::{NewRecord, Record};
pub use status::RecordStatus;
