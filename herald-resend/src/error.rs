//! Error types for the resend service.
//!
//! Ordinary delivery failures never show up here; they are absorbed by the
//! retry mechanism and only visible through the ledger and the logs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResendError {
    /// `initialize` was called twice.
    #[error("Resend service already initialised")]
    AlreadyInitialized,

    /// `initialize` was called after `shutdown`.
    #[error("Resend service has been shut down")]
    ShutDown,
}
