//! Attempt accounting
//!
//! Automatic and manual resends share one counter per message. A counter
//! that has never been written counts as 1, so with the default bounds a
//! message gets two automatic resends, then one manual resend on top of
//! those, and nothing more.

use crate::ResendConfig;

/// Which bound a resend is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendBound {
    /// Timer firings and reconnection sweeps
    Automatic,
    /// User requests
    Manual,
}

impl ResendBound {
    pub const fn limit(self, config: &ResendConfig) -> u32 {
        match self {
            Self::Automatic => config.max_auto_resends,
            Self::Manual => config.max_manual_resends,
        }
    }
}

impl std::fmt::Display for ResendBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Send, then store `attempts` as the new counter
    Allowed { attempts: u32 },
    /// The counter is already past the bound
    Refused { attempts: u32 },
}

/// Check a resend against `limit`, given the stored counter
pub const fn admit(counter: Option<u32>, limit: u32) -> Admission {
    let current = match counter {
        Some(attempts) => attempts,
        None => 1,
    };

    if current > limit {
        Admission::Refused { attempts: current }
    } else {
        Admission::Allowed {
            attempts: current.saturating_add(1),
        }
    }
}

/// Whether the user may still ask for a resend
///
/// Only the counter is considered here; the caller checks that a live record
/// exists.
pub const fn manual_resend_available(counter: Option<u32>, limit: u32) -> bool {
    match counter {
        Some(attempts) => attempts <= limit,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fresh_counter_counts_as_one() {
        assert_eq!(admit(None, 2), Admission::Allowed { attempts: 2 });
    }

    #[test]
    fn test_auto_then_manual_sequence() {
        let config = ResendConfig::default();
        let auto = ResendBound::Automatic.limit(&config);
        let manual = ResendBound::Manual.limit(&config);

        let mut counter = None;
        let mut step = |limit| {
            let admission = admit(counter, limit);
            if let Admission::Allowed { attempts } = admission {
                counter = Some(attempts);
            }
            admission
        };

        assert_eq!(step(auto), Admission::Allowed { attempts: 2 });
        assert_eq!(step(auto), Admission::Allowed { attempts: 3 });
        assert_eq!(step(auto), Admission::Refused { attempts: 3 });
        assert_eq!(step(manual), Admission::Allowed { attempts: 4 });
        assert_eq!(step(manual), Admission::Refused { attempts: 4 });
        assert_eq!(step(auto), Admission::Refused { attempts: 4 });
    }

    #[test]
    fn test_manual_availability() {
        assert!(manual_resend_available(None, 3));
        assert!(manual_resend_available(Some(3), 3));
        assert!(!manual_resend_available(Some(4), 3));
    }

    #[test]
    fn test_saturates() {
        assert_eq!(
            admit(Some(u32::MAX - 1), u32::MAX),
            Admission::Allowed { attempts: u32::MAX }
        );
        assert_eq!(
            admit(Some(u32::MAX), u32::MAX),
            Admission::Allowed { attempts: u32::MAX }
        );
    }
}
