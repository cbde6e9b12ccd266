//! Per-message resend timers
//!
//! At most one timer exists per message id. Each armed timer carries a
//! generation number; when it fires, the handler must call
//! [`ResendScheduler::complete`] with that generation, which fails if the
//! timer has been replaced or cancelled in the meantime.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use herald_ledger::MessageId;
use tokio::task::AbortHandle;

#[derive(Debug)]
struct Timer {
    generation: u64,
    delay: Duration,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
pub struct ResendScheduler {
    timers: DashMap<MessageId, Timer>,
    next_generation: AtomicU64,
}

impl ResendScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `id`, replacing any existing one
    ///
    /// `fire` receives the generation of the new timer and builds the future
    /// that runs once `delay` has elapsed. Must be called from within a Tokio
    /// runtime.
    pub fn arm<F, Fut>(&self, id: &MessageId, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(id);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = fire(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        })
        .abort_handle();

        self.timers.insert(
            id.clone(),
            Timer {
                generation,
                delay,
                handle,
            },
        );

        generation
    }

    /// Claim a fired timer
    ///
    /// Returns `false` if `generation` is no longer the armed timer for `id`.
    pub fn complete(&self, id: &MessageId, generation: u64) -> bool {
        self.timers
            .remove_if(id, |_, timer| timer.generation == generation)
            .is_some()
    }

    /// Cancel the timer for `id`, returning whether one was armed
    pub fn cancel(&self, id: &MessageId) -> bool {
        self.timers.remove(id).is_some_and(|(_, timer)| {
            timer.handle.abort();
            true
        })
    }

    /// Cancel every timer, returning how many were armed
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<MessageId> = self.timers.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_armed(&self, id: &MessageId) -> bool {
        self.timers.contains_key(id)
    }

    /// The delay the current timer for `id` was armed with
    pub fn armed_delay(&self, id: &MessageId) -> Option<Duration> {
        self.timers.get(id).map(|timer| timer.delay)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    type Fire = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counting(
        scheduler: &Arc<ResendScheduler>,
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce(u64) -> Fire {
        let scheduler = Arc::clone(scheduler);
        let fired = Arc::clone(fired);
        move |generation: u64| -> Fire {
            Box::pin(async move {
                if scheduler.complete(&MessageId::from("m1"), generation) {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = Arc::new(ResendScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = MessageId::from("m1");

        scheduler.arm(&id, Duration::from_secs(15), counting(&scheduler, &fired));
        assert_eq!(scheduler.armed_delay(&id), Some(Duration::from_secs(15)));

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = Arc::new(ResendScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = MessageId::from("m1");

        let first = scheduler.arm(&id, Duration::from_secs(15), counting(&scheduler, &fired));
        let second = scheduler.arm(&id, Duration::from_secs(120), counting(&scheduler, &fired));
        assert_ne!(first, second);
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.complete(&id, first));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = Arc::new(ResendScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));

        for id in ["m1", "m2", "m3"] {
            scheduler.arm(
                &MessageId::from(id),
                Duration::from_secs(1),
                counting(&scheduler, &fired),
            );
        }

        assert_eq!(scheduler.cancel_all(), 3);
        assert!(scheduler.is_empty());
        assert!(!scheduler.cancel(&MessageId::from("m1")));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
