//! Name resolution for backup sources referenced by a job.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::SourceId;

/// Resolves one kind of backup source (apps, websites, or databases)
/// between local numeric ids and stable names.
///
/// Export replaces ids with names through this trait; import resolves
/// them back. A failed lookup is reported as a `Resolution` error, which
/// import treats as recoverable.
#[async_trait]
pub trait SourceResolver: Send + Sync + 'static {
    /// Resolve a source id to its stable name.
    async fn name_of(&self, id: SourceId) -> AppResult<String>;

    /// Resolve a stable name back to a local source id.
    async fn id_of(&self, name: &str) -> AppResult<SourceId>;
}
