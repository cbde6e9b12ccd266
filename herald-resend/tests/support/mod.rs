//! Shared fixtures for resend service tests
#![allow(dead_code)] // Not every test file uses every helper

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::{
    ConfidentialMessage, DeliveryStatus, KeyPair, NetworkId, NetworkIdWithKeyPair, NodeState,
    SealedData, TransportType,
};
use herald_ledger::{LedgerSnapshot, MessageId, RetryLedger, RetryRecord, TestBackingStore};
use herald_resend::{
    DeliveryStatusRegistry, NodeStateRegistry, ResendConfig, ResendService, SendGateway,
};
use parking_lot::Mutex;

/// A record whose cipher text is its own id, so sends can be traced back
pub fn record(id: &str, status: DeliveryStatus) -> RetryRecord {
    RetryRecord::new(
        MessageId::from(id),
        ConfidentialMessage::new(
            SealedData {
                sender_public_key: vec![1, 2, 3],
                hmac: vec![4],
                iv: vec![5],
                cipher_text: id.as_bytes().to_vec(),
                signature: vec![6],
            },
            "peer-key".to_string(),
        ),
        NetworkIdWithKeyPair::new(
            NetworkId::new(vec![7]),
            KeyPair {
                public: vec![7],
                private: vec![8],
            },
        ),
        NetworkId::new(vec![9]),
        status,
        Duration::from_secs(10 * 24 * 60 * 60),
    )
}

/// Records every send and optionally reports a status for it
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<MessageId>>,
    reply: Mutex<Option<(Arc<DeliveryStatusRegistry>, DeliveryStatus)>>,
}

impl RecordingGateway {
    /// After each send, report `status` for the sent message
    pub fn reply_with(&self, statuses: &Arc<DeliveryStatusRegistry>, status: DeliveryStatus) {
        *self.reply.lock() = Some((Arc::clone(statuses), status));
    }

    pub fn stop_replying(&self) {
        *self.reply.lock() = None;
    }

    pub fn sent(&self) -> Vec<MessageId> {
        self.sent.lock().clone()
    }

    pub fn sends_of(&self, id: &str) -> usize {
        self.sent.lock().iter().filter(|sent| sent.as_str() == id).count()
    }
}

#[async_trait]
impl SendGateway for RecordingGateway {
    async fn confidential_send(
        &self,
        message: &ConfidentialMessage,
        _receiver: &NetworkId,
        _sender: &NetworkIdWithKeyPair,
    ) {
        let id = MessageId::from(
            String::from_utf8(message.sealed.cipher_text.clone()).expect("utf8 test id"),
        );
        self.sent.lock().push(id.clone());

        let reply = self.reply.lock().clone();
        if let Some((statuses, status)) = reply {
            statuses.set(&id, status);
        }
    }
}

pub struct Harness {
    pub service: ResendService,
    pub ledger: Arc<RetryLedger>,
    pub store: TestBackingStore,
    pub statuses: Arc<DeliveryStatusRegistry>,
    pub nodes: Arc<NodeStateRegistry>,
    pub gateway: Arc<RecordingGateway>,
}

impl Harness {
    /// An initialised service over an empty ledger
    pub fn new() -> Self {
        let store = TestBackingStore::new();
        let ledger = Arc::new(RetryLedger::new(Arc::new(store.clone())));
        let harness = Self::build(store, ledger);
        harness.service.initialize().expect("initialise");
        harness
    }

    /// An initialised service over a ledger loaded from `snapshot`
    pub async fn restored(snapshot: LedgerSnapshot) -> Self {
        let harness = Self::loaded(snapshot).await;
        harness.service.initialize().expect("initialise");
        harness
    }

    /// A service over a ledger loaded from `snapshot`, not yet initialised
    pub async fn loaded(snapshot: LedgerSnapshot) -> Self {
        let store = TestBackingStore::with_snapshot(snapshot);
        let ledger = RetryLedger::load(Arc::new(store.clone()))
            .await
            .expect("load ledger");
        Self::build(store, Arc::new(ledger))
    }

    pub fn build(store: TestBackingStore, ledger: Arc<RetryLedger>) -> Self {
        let statuses = Arc::new(DeliveryStatusRegistry::new());
        let nodes = Arc::new(NodeStateRegistry::new(&[
            TransportType::Clear,
            TransportType::Tor,
        ]));
        let gateway = Arc::new(RecordingGateway::default());

        let service = ResendService::new(
            ResendConfig::default(),
            Arc::clone(&ledger),
            gateway.clone(),
            statuses.clone(),
            nodes.clone(),
        );

        Self {
            service,
            ledger,
            store,
            statuses,
            nodes,
            gateway,
        }
    }

    /// Report `status` for `id` and let the service react
    pub async fn report(&self, id: &str, status: DeliveryStatus) {
        self.statuses.set(&MessageId::from(id), status);
        settle().await;
    }

    pub async fn register(&self, id: &str, status: DeliveryStatus) {
        self.statuses.set(&MessageId::from(id), status);
        self.service.register(record(id, status)).await;
        settle().await;
    }

    pub fn bring_up(&self, transport: TransportType) {
        self.nodes.set(transport, NodeState::Running);
    }

    pub fn take_down(&self, transport: TransportType) {
        self.nodes.set(transport, NodeState::Stopping);
    }

    pub fn id(id: &str) -> MessageId {
        MessageId::from(id)
    }
}

/// Let spawned tasks run until they are all waiting on time or channels
///
/// With a paused clock the runtime only advances time once every task is
/// idle, so a short sleep is enough.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Move the paused clock forward, running every timer that falls due
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
