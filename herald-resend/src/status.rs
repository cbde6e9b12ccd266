//! Delivery status streams
//!
//! The transport reports a status per message id. The resend service only
//! needs to observe those reports, which is what [`DeliveryStatusSource`]
//! describes. [`DeliveryStatusRegistry`] is the in-process implementation
//! the transport writes into.

use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::DeliveryStatus;
use herald_ledger::MessageId;
use tokio::sync::{broadcast, watch};

const ADDED_CHANNEL_CAPACITY: usize = 1024;

pub trait DeliveryStatusSource: Send + Sync {
    /// Every id the source currently holds a status for
    fn message_ids(&self) -> Vec<MessageId>;

    /// Observe the status of `id`
    ///
    /// The receiver starts out holding the current status, which has not
    /// been marked as seen.
    fn subscribe(&self, id: &MessageId) -> Option<watch::Receiver<DeliveryStatus>>;

    /// Ids seen for the first time after this call
    fn subscribe_added(&self) -> broadcast::Receiver<MessageId>;
}

#[derive(Debug)]
pub struct DeliveryStatusRegistry {
    statuses: DashMap<MessageId, watch::Sender<DeliveryStatus>>,
    added: broadcast::Sender<MessageId>,
}

impl Default for DeliveryStatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryStatusRegistry {
    pub fn new() -> Self {
        let (added, _) = broadcast::channel(ADDED_CHANNEL_CAPACITY);
        Self {
            statuses: DashMap::new(),
            added,
        }
    }

    /// Record `status` for `id`, notifying subscribers
    pub fn set(&self, id: &MessageId, status: DeliveryStatus) {
        let inserted = match self.statuses.entry(id.clone()) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(status);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(watch::channel(status).0);
                true
            }
        };

        if inserted {
            // No listener yet is fine; they scan existing ids when they start.
            let _ = self.added.send(id.clone());
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<DeliveryStatus> {
        self.statuses.get(id).map(|sender| *sender.borrow())
    }

    /// Forget `id`; current subscribers see their stream close
    pub fn remove(&self, id: &MessageId) -> bool {
        self.statuses.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl DeliveryStatusSource for DeliveryStatusRegistry {
    fn message_ids(&self) -> Vec<MessageId> {
        self.statuses.iter().map(|entry| entry.key().clone()).collect()
    }

    fn subscribe(&self, id: &MessageId) -> Option<watch::Receiver<DeliveryStatus>> {
        self.statuses.get(id).map(|sender| {
            let mut receiver = sender.subscribe();
            receiver.mark_changed();
            receiver
        })
    }

    fn subscribe_added(&self) -> broadcast::Receiver<MessageId> {
        self.added.subscribe()
    }
}
