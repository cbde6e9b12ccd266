//! Reconnection sweep
//!
//! Messages that were in flight when a transport dropped may be left with no
//! timer, for example after a restart. Each time a transport reaches
//! `Running` the service waits out a short debounce and then retries every
//! such message once.

use std::{sync::Weak, time::Duration};

use herald_common::{NodeState, TransportType, internal};
use tokio::{sync::watch, task::JoinHandle};

use crate::service::Inner;

/// Watch `states` and sweep after every transition into `Running`
///
/// The initial state counts as a transition, so a transport that is already
/// running when the service starts triggers one sweep.
pub(crate) fn spawn(
    service: Weak<Inner>,
    transport: TransportType,
    mut states: watch::Receiver<NodeState>,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        states.mark_changed();

        while states.changed().await.is_ok() {
            if *states.borrow_and_update() != NodeState::Running {
                continue;
            }

            internal!(
                level = DEBUG,
                "Transport {transport} is running, sweeping in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;

            let Some(service) = service.upgrade() else {
                return;
            };
            let resent = service.sweep().await;
            if resent > 0 {
                internal!(
                    level = INFO,
                    "Resent {resent} messages after {transport} became available"
                );
            }
        }
    })
}
