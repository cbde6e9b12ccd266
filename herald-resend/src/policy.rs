//! Delivery status classification
//!
//! Every status change for a tracked message is mapped to one [`Decision`]:
//! what happens to the ledger record, what happens to the resend timer, and
//! whether the status subscription can be dropped.
//!
//! | Status                                       | Ledger | Timer                   | Subscription |
//! |----------------------------------------------|--------|-------------------------|--------------|
//! | `CONNECTING`, `SENT`, `TRY_ADD_TO_MAILBOX`   | upsert | arm `resend_interval`   | keep         |
//! | `FAILED`                                     | upsert | arm `failed_interval`   | keep         |
//! | `ADDED_TO_MAILBOX`                           | upsert | cancel                  | keep         |
//! | `ACK_RECEIVED`, `MAILBOX_MSG_RECEIVED`       | remove | cancel                  | detach       |

use std::time::Duration;

use herald_common::DeliveryStatus;

use crate::ResendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    /// Store the record with its new status
    Upsert,
    /// Drop the record and its attempt counter
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Replace any pending timer with one firing after the given delay
    Arm(Duration),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub ledger: LedgerAction,
    pub timer: TimerAction,
    /// Stop listening for further status changes
    pub detach: bool,
}

/// Map a delivery status onto the actions it requires
pub const fn classify(status: DeliveryStatus, config: &ResendConfig) -> Decision {
    match status {
        DeliveryStatus::Connecting | DeliveryStatus::Sent | DeliveryStatus::TryAddToMailbox => {
            Decision {
                ledger: LedgerAction::Upsert,
                timer: TimerAction::Arm(config.resend_interval()),
                detach: false,
            }
        }
        DeliveryStatus::Failed => Decision {
            ledger: LedgerAction::Upsert,
            timer: TimerAction::Arm(config.failed_resend_interval()),
            detach: false,
        },
        // The peer will pick the message up from its mailbox; nothing to resend.
        DeliveryStatus::AddedToMailbox => Decision {
            ledger: LedgerAction::Upsert,
            timer: TimerAction::Cancel,
            detach: false,
        },
        DeliveryStatus::AckReceived | DeliveryStatus::MailboxMsgReceived => Decision {
            ledger: LedgerAction::Remove,
            timer: TimerAction::Cancel,
            detach: true,
        },
    }
}

/// Whether a resend timer may be armed for a message in `status`
pub const fn rearm_allowed(status: DeliveryStatus) -> bool {
    !(status.is_received() || status.is_in_mailbox())
}

/// Whether the reconnection sweep should resend a message in `status`
///
/// Messages that already have a timer pending are left to that timer.
pub const fn needs_sweep(status: DeliveryStatus, timer_armed: bool) -> bool {
    !timer_armed && rearm_allowed(status)
}
