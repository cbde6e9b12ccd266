//! The resend service
//!
//! Every operation on a message id runs its state changes under a per-id
//! lock: the status transition, the ledger write, timer arming and
//! subscription bookkeeping happen together or not at all. The lock is never
//! held across an await; persisting and sending happen after it has been
//! released, and timer handlers re-read the latest record when they fire.

use std::{
    fmt,
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use herald_common::{DeliveryStatus, internal};
use herald_ledger::{MessageId, RetryLedger, RetryRecord};
use parking_lot::Mutex;
use tokio::{
    sync::broadcast::error::RecvError,
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::{
    DeliveryStatusSource, ResendConfig, ResendError, SendGateway, TransportAvailability,
    accounting::{self, Admission, ResendBound},
    policy::{self, Decision, LedgerAction, TimerAction},
    scheduler::ResendScheduler,
    sweeper,
};

/// A status stream being watched for one message
#[derive(Debug)]
struct Subscription {
    generation: u64,
    handle: AbortHandle,
}

/// Who is applying a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Register,
    /// The watcher task of the given subscription generation
    Watcher(u64),
}

enum Transition {
    Applied(Decision),
    /// The subscription was replaced or dropped since the event was read
    Stale,
    /// No live record; the subscription has been dropped
    Untracked,
}

pub(crate) struct Inner {
    config: ResendConfig,
    ledger: Arc<RetryLedger>,
    gateway: Arc<dyn SendGateway>,
    statuses: Arc<dyn DeliveryStatusSource>,
    transports: Arc<dyn TransportAvailability>,
    scheduler: ResendScheduler,
    locks: DashMap<MessageId, Arc<Mutex<()>>>,
    subscriptions: DashMap<MessageId, Subscription>,
    next_subscription: AtomicU64,
    background: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
    shutdown: AtomicBool,
}

impl Inner {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Run `f` while holding the lock for `id`
    fn with_lock<T>(&self, id: &MessageId, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.locks.entry(id.clone()).or_default().value());
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);

        // Only the map holds it now, nobody is waiting.
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn persist(&self) {
        if let Err(err) = self.ledger.persist().await {
            error!(error = %err, "Failed to persist retry ledger");
        }
    }

    fn initialize(self: &Arc<Self>) -> Result<(), ResendError> {
        if self.is_shutdown() {
            return Err(ResendError::ShutDown);
        }
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(ResendError::AlreadyInitialized);
        }

        // Listen before scanning so an id added in between is not missed.
        let mut added = self.statuses.subscribe_added();
        let attached = self.attach_known();

        internal!(
            level = INFO,
            "Resend service tracking {} messages, {attached} with live status",
            self.ledger.len()
        );

        let mut background = self.background.lock();

        let service = Arc::downgrade(self);
        background.push(tokio::spawn(async move {
            loop {
                let next = added.recv().await;
                let Some(service) = service.upgrade() else {
                    return;
                };

                match next {
                    Ok(id) => service.with_lock(&id, || {
                        if service.ledger.find(&id).is_some() {
                            service.attach(&id);
                        }
                    }),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed new delivery status ids, rescanning");
                        service.attach_known();
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }));

        for (transport, states) in self.transports.node_states() {
            background.push(sweeper::spawn(
                Arc::downgrade(self),
                transport,
                states,
                self.config.reconnect_sweep_delay(),
            ));
        }

        Ok(())
    }

    /// Attach to every status stream that belongs to a live record
    fn attach_known(self: &Arc<Self>) -> usize {
        self.statuses
            .message_ids()
            .into_iter()
            .filter(|id| {
                self.with_lock(id, || {
                    let tracked = self.ledger.find(id).is_some();
                    if tracked {
                        self.attach(id);
                    }
                    tracked
                })
            })
            .count()
    }

    fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        for handle in self.background.lock().drain(..) {
            handle.abort();
        }

        for subscription in self.subscriptions.iter() {
            subscription.handle.abort();
        }
        self.subscriptions.clear();

        let cancelled = self.scheduler.cancel_all();
        self.locks.clear();

        internal!(
            level = INFO,
            "Resend service shut down, cancelled {cancelled} pending timers"
        );
    }

    /// Start watching the status stream of `id`. Caller holds the id lock.
    fn attach(self: &Arc<Self>, id: &MessageId) {
        if self.is_shutdown() || self.subscriptions.contains_key(id) {
            return;
        }
        let Some(mut statuses) = self.statuses.subscribe(id) else {
            return;
        };

        // Only replay the current status if the record does not carry it yet.
        let current = *statuses.borrow();
        if self
            .ledger
            .find(id)
            .is_some_and(|record| record.status == current)
        {
            drop(statuses.borrow_and_update());
        }

        let generation = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let service = Arc::downgrade(self);
        let watched = id.clone();

        let handle = tokio::spawn(async move {
            while statuses.changed().await.is_ok() {
                let status = *statuses.borrow_and_update();
                let Some(service) = service.upgrade() else {
                    return;
                };
                if service.on_status(&watched, generation, status).await.is_break() {
                    return;
                }
            }

            // The source forgot the id; drop the entry if it is still ours.
            if let Some(service) = service.upgrade() {
                service.with_lock(&watched, || {
                    service
                        .subscriptions
                        .remove_if(&watched, |_, sub| sub.generation == generation);
                });
            }
        })
        .abort_handle();

        self.subscriptions
            .insert(id.clone(), Subscription { generation, handle });
        debug!(message_id = %id, "Watching delivery status");
    }

    /// Stop watching `id`. Caller holds the id lock.
    ///
    /// A watcher detaching itself is left to return on its own so that it
    /// can still persist the transition that caused it.
    fn detach(&self, id: &MessageId, origin: Origin) {
        let Some((_, subscription)) = self.subscriptions.remove(id) else {
            return;
        };
        if origin != Origin::Watcher(subscription.generation) {
            subscription.handle.abort();
        }
    }

    /// Apply `record` according to its status. Caller holds the id lock.
    fn apply(self: &Arc<Self>, record: RetryRecord, origin: Origin) -> Decision {
        let decision = policy::classify(record.status, &self.config);
        let id = record.id.clone();
        let status = record.status;

        match decision.ledger {
            LedgerAction::Upsert => {
                self.ledger.upsert(record);
            }
            LedgerAction::Remove => {
                self.ledger.remove(&id);
                info!(message_id = %id, %status, "Message delivered, no longer tracked");
            }
        }

        match decision.timer {
            TimerAction::Arm(delay) => self.arm(&id, status, delay),
            TimerAction::Cancel => {
                self.scheduler.cancel(&id);
            }
        }

        if decision.detach {
            self.detach(&id, origin);
        }

        decision
    }

    /// Replace the resend timer for `id`. Caller holds the id lock.
    fn arm(self: &Arc<Self>, id: &MessageId, status: DeliveryStatus, delay: Duration) {
        self.scheduler.cancel(id);

        if self.is_shutdown() {
            return;
        }
        if !policy::rearm_allowed(status) {
            warn!(message_id = %id, %status, "Not arming resend timer for delivered message");
            return;
        }

        let service = Arc::downgrade(self);
        let fired = id.clone();
        self.scheduler.arm(id, delay, move |generation| async move {
            if let Some(service) = service.upgrade() {
                service.fire(&fired, generation).await;
            }
        });

        debug!(
            message_id = %id,
            %status,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Resend timer armed"
        );
    }

    async fn register(self: &Arc<Self>, record: RetryRecord) {
        if self.is_shutdown() {
            return;
        }

        let id = record.id.clone();
        let status = record.status;
        self.with_lock(&id, || {
            let decision = self.apply(record, Origin::Register);
            if !decision.detach {
                self.attach(&id);
            }
        });

        debug!(message_id = %id, %status, "Registered message for resend");
        self.persist().await;
    }

    async fn on_status(
        self: &Arc<Self>,
        id: &MessageId,
        generation: u64,
        status: DeliveryStatus,
    ) -> ControlFlow<()> {
        if self.is_shutdown() {
            return ControlFlow::Break(());
        }

        match self.with_lock(id, || self.transition(id, generation, status)) {
            Transition::Stale | Transition::Untracked => ControlFlow::Break(()),
            Transition::Applied(decision) => {
                self.persist().await;
                if decision.detach {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        }
    }

    /// Caller holds the id lock.
    fn transition(
        self: &Arc<Self>,
        id: &MessageId,
        generation: u64,
        status: DeliveryStatus,
    ) -> Transition {
        let current = self
            .subscriptions
            .get(id)
            .is_some_and(|sub| sub.generation == generation);
        if !current {
            return Transition::Stale;
        }

        // Never bring a removed record back from a late event.
        let Some(record) = self.ledger.find(id) else {
            self.subscriptions.remove(id);
            debug!(message_id = %id, %status, "Ignoring status for untracked message");
            return Transition::Untracked;
        };

        Transition::Applied(self.apply(record.derive(status), Origin::Watcher(generation)))
    }

    async fn fire(self: &Arc<Self>, id: &MessageId, generation: u64) {
        if self.is_shutdown() {
            return;
        }

        // Claiming the timer and the attempt must not be split by a transition.
        let claimed = self.with_lock(id, || {
            if self.scheduler.complete(id, generation) {
                self.claim(id, ResendBound::Automatic, false)
            } else {
                None
            }
        });

        if let Some(record) = claimed {
            self.send(record, ResendBound::Automatic).await;
        }
    }

    /// Resend the latest record for `id` if `bound` still allows it
    async fn resend(&self, id: &MessageId, bound: ResendBound, sweeping: bool) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let Some(record) = self.with_lock(id, || self.claim(id, bound, sweeping)) else {
            return false;
        };

        self.send(record, bound).await;
        true
    }

    async fn send(&self, record: RetryRecord, bound: ResendBound) {
        self.persist().await;

        info!(
            message_id = %record.id,
            status = %record.status,
            %bound,
            "Resending message"
        );
        self.gateway
            .confidential_send(&record.payload, &record.receiver_network_id, &record.sender())
            .await;
    }

    /// Take one attempt for `id`. Caller holds the id lock.
    fn claim(&self, id: &MessageId, bound: ResendBound, sweeping: bool) -> Option<RetryRecord> {
        let Some(record) = self.ledger.find(id) else {
            debug!(message_id = %id, "No live retry record, nothing to resend");
            return None;
        };

        if sweeping && !policy::needs_sweep(record.status, self.scheduler.is_armed(id)) {
            return None;
        }
        if bound == ResendBound::Automatic && !policy::rearm_allowed(record.status) {
            debug!(message_id = %id, status = %record.status, "Already delivered, not resending");
            return None;
        }

        match accounting::admit(self.ledger.attempts(id), bound.limit(&self.config)) {
            Admission::Allowed { attempts } => {
                self.ledger.set_attempts(id, attempts);
                Some(record)
            }
            Admission::Refused { attempts } => {
                warn!(
                    message_id = %id,
                    attempts,
                    %bound,
                    "Resend limit reached, giving up on this message"
                );
                None
            }
        }
    }

    pub(crate) async fn sweep(&self) -> usize {
        if self.is_shutdown() {
            return 0;
        }

        let candidates: Vec<MessageId> = self
            .ledger
            .records()
            .into_iter()
            .filter(|record| {
                !record.is_expired()
                    && policy::needs_sweep(record.status, self.scheduler.is_armed(&record.id))
            })
            .map(|record| record.id)
            .collect();

        let mut resent = 0;
        for id in candidates {
            if self.resend(&id, ResendBound::Automatic, true).await {
                resent += 1;
            }
        }
        resent
    }
}

/// Automatic and manual resending of confidential messages
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ResendService {
    inner: Arc<Inner>,
}

impl fmt::Debug for ResendService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendService")
            .field("config", &self.inner.config)
            .field("records", &self.inner.ledger.len())
            .field("timers", &self.inner.scheduler.len())
            .field("subscriptions", &self.inner.subscriptions.len())
            .field("shutdown", &self.inner.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl ResendService {
    pub fn new(
        config: ResendConfig,
        ledger: Arc<RetryLedger>,
        gateway: Arc<dyn SendGateway>,
        statuses: Arc<dyn DeliveryStatusSource>,
        transports: Arc<dyn TransportAvailability>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                ledger,
                gateway,
                statuses,
                transports,
                scheduler: ResendScheduler::new(),
                locks: DashMap::new(),
                subscriptions: DashMap::new(),
                next_subscription: AtomicU64::new(0),
                background: Mutex::new(Vec::new()),
                initialized: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Start listening for delivery status and transport changes
    ///
    /// Attaches to the status stream of every id that has a live record,
    /// then keeps attaching as new ids appear. Timers are not restored for
    /// records loaded from disk; the sweep that follows a transport reaching
    /// `Running` picks those up.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// If the service was already initialised or has been shut down
    pub fn initialize(&self) -> Result<(), ResendError> {
        self.inner.initialize()
    }

    /// Stop all timers and listeners
    ///
    /// Idempotent. Every operation is a no-op afterwards.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    /// Start tracking a message that has just been sent, or record a new
    /// status for one that is already tracked
    ///
    /// The timer follows `record.status`. If the status source already
    /// holds a different status for the id, that status is applied right
    /// after and takes over.
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = %record.id))]
    pub async fn register(&self, record: RetryRecord) {
        self.inner.register(record).await;
    }

    /// Resend `id` on behalf of the user
    ///
    /// Returns whether a send was issued.
    #[tracing::instrument(level = "debug", skip(self), fields(message_id = %id))]
    pub async fn manually_resend(&self, id: &MessageId) -> bool {
        self.inner.resend(id, ResendBound::Manual, false).await
    }

    /// Whether the user may still resend `id`
    pub fn can_manually_resend(&self, id: &MessageId) -> bool {
        self.inner.ledger.find(id).is_some()
            && accounting::manual_resend_available(
                self.inner.ledger.attempts(id),
                self.inner.config.max_manual_resends,
            )
    }

    /// Live records whose delivery is still pending, ordered by id
    pub fn pending_records(&self) -> Vec<RetryRecord> {
        self.inner
            .ledger
            .records()
            .into_iter()
            .filter(|record| record.status.is_pending() && !record.is_expired())
            .collect()
    }

    /// Resend every live record that has no timer and is not yet delivered
    ///
    /// Returns the number of messages resent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    /// The live record for `id`
    pub fn record(&self, id: &MessageId) -> Option<RetryRecord> {
        self.inner.ledger.find(id)
    }

    pub fn attempts(&self, id: &MessageId) -> Option<u32> {
        self.inner.ledger.attempts(id)
    }

    pub fn is_timer_armed(&self, id: &MessageId) -> bool {
        self.inner.scheduler.is_armed(id)
    }

    pub fn armed_delay(&self, id: &MessageId) -> Option<Duration> {
        self.inner.scheduler.armed_delay(id)
    }

    pub fn is_subscribed(&self, id: &MessageId) -> bool {
        self.inner.subscriptions.contains_key(id)
    }

    pub fn config(&self) -> &ResendConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &Arc<RetryLedger> {
        &self.inner.ledger
    }
}
