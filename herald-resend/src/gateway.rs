use async_trait::async_trait;
use herald_common::{ConfidentialMessage, NetworkId, NetworkIdWithKeyPair};

/// The network service's confidential send
///
/// Failures are reported through the delivery status stream rather than as
/// a return value, which is why this cannot fail.
#[async_trait]
pub trait SendGateway: Send + Sync {
    async fn confidential_send(
        &self,
        message: &ConfidentialMessage,
        receiver: &NetworkId,
        sender: &NetworkIdWithKeyPair,
    );
}
