use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a confidential send, as reported by the transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Connecting,
    Sent,
    AckReceived,
    TryAddToMailbox,
    AddedToMailbox,
    MailboxMsgReceived,
    Failed,
}

impl DeliveryStatus {
    /// The peer has the message, either directly or from its mailbox
    pub const fn is_received(self) -> bool {
        matches!(self, Self::AckReceived | Self::MailboxMsgReceived)
    }

    /// Still waiting on the network, and therefore eligible for automatic resends
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Sent | Self::TryAddToMailbox | Self::Failed
        )
    }

    /// Parked in the mailbox system; no automatic resend, manual resend still allowed
    pub const fn is_in_mailbox(self) -> bool {
        matches!(self, Self::AddedToMailbox)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Sent => "SENT",
            Self::AckReceived => "ACK_RECEIVED",
            Self::TryAddToMailbox => "TRY_ADD_TO_MAILBOX",
            Self::AddedToMailbox => "ADDED_TO_MAILBOX",
            Self::MailboxMsgReceived => "MAILBOX_MSG_RECEIVED",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.pad(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::DeliveryStatus;

    #[test]
    fn status() {
        assert!(DeliveryStatus::AckReceived.is_received());
        assert!(DeliveryStatus::MailboxMsgReceived.is_received());
        assert!(!DeliveryStatus::AddedToMailbox.is_received());

        assert!(DeliveryStatus::Failed.is_pending());
        assert!(DeliveryStatus::TryAddToMailbox.is_pending());
        assert!(!DeliveryStatus::AddedToMailbox.is_pending());
        assert!(!DeliveryStatus::AckReceived.is_pending());

        assert_eq!(DeliveryStatus::TryAddToMailbox.to_string(), "TRY_ADD_TO_MAILBOX");
    }
}
