use async_trait::async_trait;

use crate::types::LedgerSnapshot;

/// Durable storage for the ledger's two maps.
///
/// A store holds exactly one snapshot; every `save` replaces the previous one.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Read the last saved snapshot, or `None` if nothing was ever saved
    async fn load(&self) -> crate::Result<Option<LedgerSnapshot>>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &LedgerSnapshot) -> crate::Result<()>;
}
