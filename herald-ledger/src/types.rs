use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use herald_common::{
    ConfidentialMessage, DeliveryStatus, KeyPair, NetworkId, NetworkIdWithKeyPair,
};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Identifier of one logical send, stable across its resends
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Everything needed to resend one message, plus its last observed status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub id: MessageId,
    /// The already sealed message, resent verbatim
    pub payload: ConfidentialMessage,
    pub sender_network_id: NetworkId,
    pub sender_key_pair: KeyPair,
    pub receiver_network_id: NetworkId,
    pub status: DeliveryStatus,
    /// Unix timestamp (ms) when the record was first created
    pub created_at: u64,
    /// Unix timestamp (ms) after which the record is dropped at load
    pub expires_at: u64,
}

impl RetryRecord {
    pub fn new(
        id: MessageId,
        payload: ConfidentialMessage,
        sender: NetworkIdWithKeyPair,
        receiver_network_id: NetworkId,
        status: DeliveryStatus,
        ttl: Duration,
    ) -> Self {
        let created_at = now_ms();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        Self {
            id,
            payload,
            sender_network_id: sender.network_id,
            sender_key_pair: sender.key_pair,
            receiver_network_id,
            status,
            created_at,
            expires_at: created_at.saturating_add(ttl_ms),
        }
    }

    /// A copy of this record carrying `status`; the original is left untouched
    #[must_use]
    pub fn derive(&self, status: DeliveryStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn sender(&self) -> NetworkIdWithKeyPair {
        NetworkIdWithKeyPair::new(self.sender_network_id.clone(), self.sender_key_pair.clone())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub const fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }
}

/// The persisted form of the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub records: BTreeMap<MessageId, RetryRecord>,
    pub attempts: BTreeMap<MessageId, u32>,
}

impl LedgerSnapshot {
    /// Drop every record that has expired at `now_ms`, along with its counter.
    ///
    /// Returns the number of records removed.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(now_ms));

        let records = &self.records;
        self.attempts.retain(|id, _| records.contains_key(id));

        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::record;

    #[test]
    fn derive_replaces_status_only() {
        let original = record("m1", DeliveryStatus::Sent);
        let derived = original.derive(DeliveryStatus::Failed);

        assert_eq!(original.status, DeliveryStatus::Sent);
        assert_eq!(derived.status, DeliveryStatus::Failed);
        assert_eq!(derived.derive(DeliveryStatus::Sent), original);
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let record = record("m1", DeliveryStatus::Sent);
        assert_eq!(record.expires_at - record.created_at, 60_000);
        assert!(!record.is_expired_at(record.expires_at));
        assert!(record.is_expired_at(record.expires_at + 1));
    }

    #[test]
    fn prune_drops_expired_records_and_their_counters() {
        let mut fresh = record("fresh", DeliveryStatus::Sent);
        let mut stale = record("stale", DeliveryStatus::Failed);
        fresh.expires_at = 2_000;
        stale.expires_at = 1_000;

        let mut snapshot = LedgerSnapshot::default();
        snapshot.records.insert(fresh.id.clone(), fresh.clone());
        snapshot.records.insert(stale.id.clone(), stale.clone());
        snapshot.attempts.insert(fresh.id.clone(), 2);
        snapshot.attempts.insert(stale.id.clone(), 3);

        assert_eq!(snapshot.prune(1_500), 1);
        assert_eq!(snapshot.records.keys().collect::<Vec<_>>(), vec![&fresh.id]);
        assert_eq!(snapshot.attempts.get(&fresh.id), Some(&2));
        assert_eq!(snapshot.attempts.get(&stale.id), None);
    }
}
