//! Execution record status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome status of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The execution is still in flight.
    Running,
    /// The execution completed successfully.
    Success,
    /// The execution failed after all retries.
    Failed,
}

impl RecordStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
