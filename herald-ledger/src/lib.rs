pub mod backends;
pub mod config;
pub mod error;
pub mod ledger;
pub mod r#trait;
pub mod types;

pub use backends::{FileBackingStore, MemoryBackingStore, TestBackingStore};
pub use config::{LedgerConfig, StoreConfig};
pub use error::{LedgerError, Result, SerializationError, ValidationError};
pub use ledger::RetryLedger;
pub use r#trait::BackingStore;
pub use types::{LedgerSnapshot, MessageId, RetryRecord, now_ms};

#[cfg(test)]
mod test_support;
