use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before resending a message that is still connecting, sent or
/// being added to a mailbox
pub const RESEND_INTERVAL: Duration = Duration::from_secs(120);

/// Delay before resending a message whose last attempt failed
pub const FAILED_RESEND_INTERVAL: Duration = Duration::from_secs(15);

/// Upper bound for resends triggered by timers and reconnection sweeps
pub const MAX_AUTO_RESENDS: u32 = 2;

/// Upper bound for resends requested by the user
pub const MAX_MANUAL_RESENDS: u32 = 3;

/// Debounce between a transport becoming available and the catch-up sweep
pub const RECONNECT_SWEEP_DELAY: Duration = Duration::from_secs(10);

mod defaults {
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    const fn millis(duration: Duration) -> u64 {
        duration.as_millis() as u64
    }

    pub const fn resend_interval_ms() -> u64 {
        millis(super::RESEND_INTERVAL)
    }

    pub const fn failed_resend_interval_ms() -> u64 {
        millis(super::FAILED_RESEND_INTERVAL)
    }

    pub const fn max_auto_resends() -> u32 {
        super::MAX_AUTO_RESENDS
    }

    pub const fn max_manual_resends() -> u32 {
        super::MAX_MANUAL_RESENDS
    }

    pub const fn reconnect_sweep_delay_ms() -> u64 {
        millis(super::RECONNECT_SWEEP_DELAY)
    }
}

/// Resend timing and bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendConfig {
    /// Timer used while a message is connecting, sent or being added to a
    /// mailbox (in milliseconds)
    ///
    /// Default: 120000 (2 minutes)
    #[serde(default = "defaults::resend_interval_ms")]
    pub resend_interval_ms: u64,

    /// Timer used after a failed attempt (in milliseconds)
    ///
    /// Default: 15000 (15 seconds)
    #[serde(default = "defaults::failed_resend_interval_ms")]
    pub failed_resend_interval_ms: u64,

    /// Resends allowed from timers and reconnection sweeps
    ///
    /// Default: 2
    #[serde(default = "defaults::max_auto_resends")]
    pub max_auto_resends: u32,

    /// Resends allowed when requested by the user
    ///
    /// Shares its counter with automatic resends.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_manual_resends")]
    pub max_manual_resends: u32,

    /// Wait between a transport reaching `Running` and the catch-up sweep
    /// (in milliseconds)
    ///
    /// Default: 10000 (10 seconds)
    #[serde(default = "defaults::reconnect_sweep_delay_ms")]
    pub reconnect_sweep_delay_ms: u64,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            resend_interval_ms: defaults::resend_interval_ms(),
            failed_resend_interval_ms: defaults::failed_resend_interval_ms(),
            max_auto_resends: defaults::max_auto_resends(),
            max_manual_resends: defaults::max_manual_resends(),
            reconnect_sweep_delay_ms: defaults::reconnect_sweep_delay_ms(),
        }
    }
}

impl ResendConfig {
    pub const fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    pub const fn failed_resend_interval(&self) -> Duration {
        Duration::from_millis(self.failed_resend_interval_ms)
    }

    pub const fn reconnect_sweep_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_sweep_delay_ms)
    }
}
