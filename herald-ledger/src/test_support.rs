use std::time::Duration;

use herald_common::{
    ConfidentialMessage, DeliveryStatus, KeyPair, NetworkId, NetworkIdWithKeyPair, SealedData,
};

use crate::types::{MessageId, RetryRecord};

pub fn record(id: &str, status: DeliveryStatus) -> RetryRecord {
    RetryRecord::new(
        MessageId::from(id),
        ConfidentialMessage::new(
            SealedData {
                sender_public_key: vec![1],
                hmac: vec![2],
                iv: vec![3],
                cipher_text: id.as_bytes().to_vec(),
                signature: vec![5],
            },
            "key".to_string(),
        ),
        NetworkIdWithKeyPair::new(
            NetworkId::new(vec![9]),
            KeyPair {
                public: vec![9],
                private: vec![10],
            },
        ),
        NetworkId::new(vec![11]),
        status,
        Duration::from_secs(60),
    )
}
