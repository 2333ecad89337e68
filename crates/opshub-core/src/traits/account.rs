//! Backup account capability traits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::AccountId;

/// Artifact capabilities of one backup destination account.
///
/// Implementations exist for the local filesystem and for remote object
/// stores. The trait is defined here in `opshub-core` and implemented by
/// the concrete destination drivers, which are external to this core.
#[async_trait]
pub trait AccountClient: Send + Sync + std::fmt::Debug + 'static {
    /// Return the account's display name.
    fn name(&self) -> &str;

    /// Whether this account stores artifacts on the local filesystem.
    fn is_local(&self) -> bool;

    /// Delete the artifact at the given path.
    async fn delete(&self, path: &str) -> AppResult<()>;

    /// Upload a local file to the given remote path.
    async fn upload(&self, local: &Path, remote: &str) -> AppResult<()>;

    /// Download a remote artifact to the given local path.
    async fn download(&self, remote: &str, local: &Path) -> AppResult<()>;
}

/// Resolves backup account references to names, ids, and capabilities.
#[async_trait]
pub trait AccountResolver: Send + Sync + 'static {
    /// Resolve an account id to its capability client.
    async fn client(&self, id: AccountId) -> AppResult<Arc<dyn AccountClient>>;

    /// Resolve an account id to its stable name.
    async fn name_of(&self, id: AccountId) -> AppResult<String>;

    /// Resolve a stable name back to an account id.
    async fn id_of(&self, name: &str) -> AppResult<AccountId>;

    /// Return the sole local backup account, if one is configured.
    async fn local(&self) -> AppResult<Option<AccountId>>;
}
