//! Reliable delivery for confidential messages
//!
//! This crate keeps track of messages that have been handed to the transport
//! and makes sure they get there:
//! - Classify every delivery status change and persist it to the retry ledger
//! - Re-arm a per-message resend timer while delivery is still pending
//! - Bound automatic and manual resends with a shared attempt counter
//! - Sweep timer-less records when a transport comes back up

pub mod accounting;
mod config;
mod error;
mod gateway;
pub mod policy;
mod scheduler;
mod service;
mod status;
mod sweeper;
mod transport;

pub use accounting::{Admission, ResendBound};
pub use config::{
    FAILED_RESEND_INTERVAL, MAX_AUTO_RESENDS, MAX_MANUAL_RESENDS, RECONNECT_SWEEP_DELAY,
    RESEND_INTERVAL, ResendConfig,
};
pub use error::ResendError;
pub use gateway::SendGateway;
pub use policy::{Decision, LedgerAction, TimerAction};
pub use scheduler::ResendScheduler;
pub use service::ResendService;
pub use status::{DeliveryStatusRegistry, DeliveryStatusSource};
pub use transport::{NodeStateRegistry, TransportAvailability};
