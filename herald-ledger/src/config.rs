use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::BackingStore,
};

const fn default_record_ttl_secs() -> u64 {
    10 * 24 * 60 * 60 // 10 days
}

/// Where the ledger is persisted
///
/// File-backed ledger in RON config:
/// ```ron
/// store: File(
///     path: "/var/lib/herald/resend.ledger",
/// ),
/// ```
///
/// Memory-backed ledger (nothing survives a restart):
/// ```ron
/// store: Memory,
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    File { path: PathBuf },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: FileBackingStore::default().path().to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub store: StoreConfig,

    /// How long a retry record stays eligible for resends (in seconds)
    ///
    /// Records older than this are dropped the next time the ledger is loaded.
    ///
    /// Default: 864000 seconds (10 days)
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            record_ttl_secs: default_record_ttl_secs(),
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub const fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    /// Build and initialise the configured backing store
    ///
    /// # Errors
    /// If the file path is invalid or its directory cannot be prepared
    pub fn into_backing_store(self) -> crate::Result<Arc<dyn BackingStore>> {
        match self.store {
            StoreConfig::File { path } => {
                let store = FileBackingStore::builder().path(path).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            StoreConfig::Memory => Ok(Arc::new(MemoryBackingStore::new())),
        }
    }
}
