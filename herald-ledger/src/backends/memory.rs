use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{r#trait::BackingStore, types::LedgerSnapshot};

/// In-memory backing store implementation
///
/// Keeps the last saved snapshot behind an `RwLock`. Nothing survives the
/// process, so this is meant for tests and nodes that opt out of persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    pub(crate) snapshot: Arc<RwLock<Option<LedgerSnapshot>>>,
}

impl MemoryBackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `snapshot`, as if it had been saved
    /// by a previous run
    #[must_use]
    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Some(snapshot))),
        }
    }

    /// The currently stored snapshot
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn snapshot(&self) -> Option<LedgerSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn load(&self) -> crate::Result<Option<LedgerSnapshot>> {
        Ok(self.snapshot.read()?.clone())
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> crate::Result<()> {
        *self.snapshot.write()? = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use herald_common::DeliveryStatus;

    use super::*;
    use crate::test_support::record;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryBackingStore::new();
        assert!(store.load().await.expect("load").is_none());

        let mut snapshot = LedgerSnapshot::default();
        let record = record("m1", DeliveryStatus::Sent);
        snapshot.records.insert(record.id.clone(), record);

        store.save(&snapshot).await.expect("save");
        assert_eq!(store.load().await.expect("load"), Some(snapshot.clone()));
        assert_eq!(store.snapshot(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryBackingStore::new();
        let clone = store.clone();

        store
            .save(&LedgerSnapshot::default())
            .await
            .expect("save");

        assert!(clone.snapshot().is_some());
    }
}
