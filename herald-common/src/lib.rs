pub mod envelope;
pub mod logging;
pub mod network;
pub mod resolver;
pub mod status;

pub use tracing;

pub use self::{
    envelope::{ConfidentialMessage, SealedData},
    network::{Address, KeyPair, NetworkId, NetworkIdWithKeyPair, NodeState, TransportType},
    status::DeliveryStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
