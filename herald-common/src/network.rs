//! Network identity and transport types shared by the delivery core
//! and its collaborators.

use std::fmt::{self, Debug, Display};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum TransportType {
    Clear,
    Tor,
    I2p,
}

impl Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clear => "CLEAR",
            Self::Tor => "TOR",
            Self::I2p => "I2P",
        })
    }
}

/// Lifecycle of the default node of one transport
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A peer's addresses per transport, plus the public key it is known by
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct NetworkId {
    pub addresses: AHashMap<TransportType, Address>,
    pub public_key: Vec<u8>,
}

impl NetworkId {
    pub fn new(public_key: Vec<u8>) -> Self {
        Self {
            addresses: AHashMap::default(),
            public_key,
        }
    }

    #[must_use]
    pub fn with_address(mut self, transport: TransportType, address: Address) -> Self {
        self.addresses.insert(transport, address);
        self
    }

    pub fn address(&self, transport: TransportType) -> Option<&Address> {
        self.addresses.get(&transport)
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut transports: Vec<_> = self.addresses.iter().collect();
        transports.sort_by_key(|(transport, _)| **transport);

        for (i, (transport, address)) in transports.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{transport}={address}")?;
        }

        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

// Keep private key material out of logs
impl Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// The identity a send is issued from
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct NetworkIdWithKeyPair {
    pub network_id: NetworkId,
    pub key_pair: KeyPair,
}

impl NetworkIdWithKeyPair {
    pub const fn new(network_id: NetworkId, key_pair: KeyPair) -> Self {
        Self {
            network_id,
            key_pair,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_display_is_sorted_by_transport() {
        let id = NetworkId::new(vec![1, 2, 3])
            .with_address(TransportType::Tor, Address::new("abc.onion", 1000))
            .with_address(TransportType::Clear, Address::new("127.0.0.1", 8000));

        assert_eq!(id.to_string(), "CLEAR=127.0.0.1:8000, TOR=abc.onion:1000");
        assert_eq!(
            id.address(TransportType::Tor),
            Some(&Address::new("abc.onion", 1000))
        );
        assert_eq!(id.address(TransportType::I2p), None);
    }

    #[test]
    fn key_pair_debug_redacts_private_key() {
        let pair = KeyPair {
            public: vec![7],
            private: vec![42, 42, 42],
        };

        let debug = format!("{pair:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("42"));
    }
}
