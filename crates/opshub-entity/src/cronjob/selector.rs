//! Backup source selection.

use serde::{Deserialize, Serialize};

use opshub_core::types::id::SourceId;

/// Which backup sources (apps, websites, or databases) a job covers.
///
/// `All` is a distinct variant rather than a sentinel id: export preserves
/// it verbatim and never resolves it to names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceSelector {
    /// Every source of the job's type, including ones created later.
    #[default]
    All,
    /// An explicit set of source ids.
    ByIds(Vec<SourceId>),
}

impl SourceSelector {
    /// Whether this selector covers all sources.
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Return the explicit ids, empty for `All`.
    pub fn ids(&self) -> &[SourceId] {
        match self {
            Self::All => &[],
            Self::ByIds(ids) => ids,
        }
    }
}
