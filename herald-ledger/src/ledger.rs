//! The in-memory ledger and its write-through persistence.

use std::sync::Arc;

use dashmap::DashMap;
use herald_common::internal;
use tokio::sync::Mutex;

use crate::{
    r#trait::BackingStore,
    types::{LedgerSnapshot, MessageId, RetryRecord, now_ms},
};

/// Retry records and attempt counters keyed by message id
///
/// Callers are expected to serialize mutations per id; the ledger only
/// guarantees that each individual map operation is atomic and that saves
/// are written in the order they were requested.
#[derive(Debug)]
pub struct RetryLedger {
    records: DashMap<MessageId, RetryRecord>,
    attempts: DashMap<MessageId, u32>,
    store: Arc<dyn BackingStore>,
    /// Held for the whole snapshot-then-save sequence
    write_lock: Mutex<()>,
}

impl RetryLedger {
    /// An empty ledger saving to `store`
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self {
            records: DashMap::new(),
            attempts: DashMap::new(),
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the ledger from `store`, dropping records that have expired
    ///
    /// # Errors
    /// If the store cannot be read or its contents cannot be decoded
    pub async fn load(store: Arc<dyn BackingStore>) -> crate::Result<Self> {
        let ledger = Self::new(store);

        let Some(mut snapshot) = ledger.store.load().await? else {
            internal!("No persisted retry ledger found, starting empty");
            return Ok(ledger);
        };

        let pruned = snapshot.prune(now_ms());
        if pruned > 0 {
            internal!(level = INFO, "Pruned {pruned} expired retry records");
        }

        internal!(
            level = INFO,
            "Loaded {} retry records from ledger",
            snapshot.records.len()
        );

        for (id, record) in snapshot.records {
            ledger.records.insert(id, record);
        }
        for (id, attempts) in snapshot.attempts {
            ledger.attempts.insert(id, attempts);
        }

        Ok(ledger)
    }

    /// The record for `id`, unless it has expired
    pub fn find(&self, id: &MessageId) -> Option<RetryRecord> {
        self.records
            .get(id)
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.value().clone())
    }

    /// The record for `id`, expired or not
    pub fn get(&self, id: &MessageId) -> Option<RetryRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace the record for `record.id`, returning the previous one
    pub fn upsert(&self, record: RetryRecord) -> Option<RetryRecord> {
        self.records.insert(record.id.clone(), record)
    }

    /// Remove the record for `id` together with its attempt counter
    pub fn remove(&self, id: &MessageId) -> Option<RetryRecord> {
        self.attempts.remove(id);
        self.records.remove(id).map(|(_, record)| record)
    }

    /// Number of resend attempts recorded for `id`
    pub fn attempts(&self, id: &MessageId) -> Option<u32> {
        self.attempts.get(id).map(|entry| *entry.value())
    }

    pub fn set_attempts(&self, id: &MessageId, attempts: u32) {
        self.attempts.insert(id.clone(), attempts);
    }

    /// All records, ordered by id
    pub fn records(&self) -> Vec<RetryRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            records: self
                .records
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            attempts: self
                .attempts
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }

    /// Write the current state to the backing store
    ///
    /// The snapshot is taken after acquiring the write lock, so a save that
    /// starts later never writes older state than one that started earlier.
    ///
    /// # Errors
    /// If the backing store fails to save
    pub async fn persist(&self) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use herald_common::DeliveryStatus;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{backends::TestBackingStore, test_support::record};

    #[tokio::test]
    async fn test_load_prunes_expired_records() {
        let mut fresh = record("fresh", DeliveryStatus::Sent);
        let mut stale = record("stale", DeliveryStatus::Failed);
        fresh.expires_at = u64::MAX;
        stale.expires_at = 1;

        let mut snapshot = LedgerSnapshot::default();
        snapshot.attempts.insert(stale.id.clone(), 2);
        snapshot.records.insert(fresh.id.clone(), fresh.clone());
        snapshot.records.insert(stale.id.clone(), stale.clone());

        let store = TestBackingStore::with_snapshot(snapshot);
        let ledger = RetryLedger::load(Arc::new(store.clone()))
            .await
            .expect("load");

        assert_eq!(ledger.records(), vec![fresh]);
        assert_eq!(ledger.attempts(&stale.id), None);
        // Pruning happens in memory only; nothing is written until the next mutation
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_drops_counter() {
        let ledger = RetryLedger::new(Arc::new(TestBackingStore::new()));
        let record = record("m1", DeliveryStatus::Sent);

        ledger.upsert(record.clone());
        ledger.set_attempts(&record.id, 2);
        assert_eq!(ledger.attempts(&record.id), Some(2));

        assert_eq!(ledger.remove(&record.id), Some(record.clone()));
        assert_eq!(ledger.attempts(&record.id), None);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_find_ignores_expired() {
        let ledger = RetryLedger::new(Arc::new(TestBackingStore::new()));
        let mut record = record("m1", DeliveryStatus::Sent);
        record.expires_at = 1;
        ledger.upsert(record.clone());

        assert_eq!(ledger.find(&record.id), None);
        assert_eq!(ledger.get(&record.id), Some(record));
    }

    #[tokio::test]
    async fn test_persist_writes_snapshot() {
        let store = TestBackingStore::new();
        let ledger = RetryLedger::new(Arc::new(store.clone()));
        let record = record("m1", DeliveryStatus::Failed);

        ledger.upsert(record.clone());
        ledger.set_attempts(&record.id, 3);
        ledger.persist().await.expect("persist");

        let saved = store.snapshot().expect("saved");
        assert_eq!(saved, ledger.snapshot());
        assert_eq!(saved.attempts.get(&record.id), Some(&3));
        assert_eq!(store.save_count(), 1);
    }
}
