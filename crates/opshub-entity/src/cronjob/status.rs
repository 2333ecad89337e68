//! Job status and type enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a cron job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Imported or repaired-pending: some referenced name did not resolve.
    /// The job never fires until a successful update flips it to `Enable`.
    Pending,
    /// Registered in the firing table.
    Enable,
    /// Persisted but not registered; never fires.
    Disable,
}

impl JobStatus {
    /// Whether jobs in this status carry registered entry handles.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enable)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of maintenance work a cron job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// Run an arbitrary shell command or script.
    Shell,
    /// Back up installed applications.
    App,
    /// Back up websites.
    Website,
    /// Dump databases.
    Database,
    /// Archive a directory.
    Directory,
    /// Take a full system snapshot.
    Snapshot,
    /// Rotate and archive website access logs.
    CutWebsiteLog,
}

impl JobType {
    /// Whether executions of this type produce backup artifacts subject
    /// to retention trimming.
    pub fn has_backup(&self) -> bool {
        !matches!(self, Self::Shell)
    }

    /// Whether this type selects backup sources (apps, websites, or
    /// databases) through a [`super::SourceSelector`].
    pub fn has_sources(&self) -> bool {
        matches!(self, Self::App | Self::Website | Self::Database)
    }

    /// Return the type as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::App => "app",
            Self::Website => "website",
            Self::Database => "database",
            Self::Directory => "directory",
            Self::Snapshot => "snapshot",
            Self::CutWebsiteLog => "cutWebsiteLog",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
