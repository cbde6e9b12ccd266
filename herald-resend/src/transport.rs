//! Transport lifecycle
//!
//! A transport becoming available is what triggers the reconnection sweep.

use ahash::AHashMap;
use herald_common::{NodeState, TransportType, internal};
use tokio::sync::watch;

pub trait TransportAvailability: Send + Sync {
    /// One state stream per supported transport
    fn node_states(&self) -> Vec<(TransportType, watch::Receiver<NodeState>)>;
}

/// Node state per transport, as written by the network layer
#[derive(Debug)]
pub struct NodeStateRegistry {
    states: AHashMap<TransportType, watch::Sender<NodeState>>,
}

impl NodeStateRegistry {
    pub fn new(transports: &[TransportType]) -> Self {
        Self {
            states: transports
                .iter()
                .map(|transport| (*transport, watch::channel(NodeState::default()).0))
                .collect(),
        }
    }

    /// Move `transport` to `state`
    ///
    /// Subscribers are only woken when the state actually changes.
    pub fn set(&self, transport: TransportType, state: NodeState) {
        let Some(sender) = self.states.get(&transport) else {
            internal!(level = WARN, "Ignoring state for unsupported transport {transport}");
            return;
        };

        sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn state(&self, transport: TransportType) -> Option<NodeState> {
        self.states.get(&transport).map(|sender| *sender.borrow())
    }

    pub fn transports(&self) -> Vec<TransportType> {
        let mut transports: Vec<_> = self.states.keys().copied().collect();
        transports.sort();
        transports
    }
}

impl TransportAvailability for NodeStateRegistry {
    fn node_states(&self) -> Vec<(TransportType, watch::Receiver<NodeState>)> {
        let mut states: Vec<_> = self
            .states
            .iter()
            .map(|(transport, sender)| (*transport, sender.subscribe()))
            .collect();
        states.sort_by_key(|(transport, _)| *transport);
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_transitions_notify() {
        let registry = NodeStateRegistry::new(&[TransportType::Tor, TransportType::Clear]);
        assert_eq!(
            registry.transports(),
            vec![TransportType::Clear, TransportType::Tor]
        );

        let mut states = registry.node_states();
        let (transport, receiver) = &mut states[1];
        assert_eq!(*transport, TransportType::Tor);
        assert_eq!(*receiver.borrow_and_update(), NodeState::New);

        registry.set(TransportType::Tor, NodeState::New);
        assert!(!receiver.has_changed().expect("open"));

        registry.set(TransportType::Tor, NodeState::Running);
        assert!(receiver.has_changed().expect("open"));
        assert_eq!(registry.state(TransportType::Tor), Some(NodeState::Running));
    }

    #[test]
    fn test_unknown_transport_is_ignored() {
        let registry = NodeStateRegistry::new(&[TransportType::Clear]);
        registry.set(TransportType::I2p, NodeState::Running);
        assert_eq!(registry.state(TransportType::I2p), None);
    }
}
