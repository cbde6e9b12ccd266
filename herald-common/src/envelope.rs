//! Payload shapes at the boundary of the delivery core.
//!
//! The core never opens these; it only carries them between the sending
//! code path, the ledger and the send gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default validity window of authenticated broadcast data
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// Allowance for the signature and public-key material carried alongside
/// authenticated data (251 bytes of keys plus 463 bytes of signature overhead)
pub const AUTHENTICATION_OVERHEAD: usize = 251 + 463;

/// Storage metadata used for bandwidth and size accounting
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MetaData {
    pub ttl: Duration,
    pub size_allowance: usize,
    pub class_name: String,
}

/// Anything that can be placed on the distributed data network
pub trait DistributedData {
    /// Metadata describing size and lifetime, if the type carries any
    fn meta_data(&self) -> Option<MetaData>;

    fn is_data_invalid(&self) -> bool;
}

/// Output of the sealing step: an encrypted body plus what the receiver
/// needs to authenticate and open it
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SealedData {
    pub sender_public_key: Vec<u8>,
    pub hmac: Vec<u8>,
    pub iv: Vec<u8>,
    pub cipher_text: Vec<u8>,
    pub signature: Vec<u8>,
}

/// A sealed payload together with the id of the key the receiver should
/// decrypt it with
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ConfidentialMessage {
    pub sealed: SealedData,
    pub key_id: String,
}

impl ConfidentialMessage {
    pub const fn new(sealed: SealedData, key_id: String) -> Self {
        Self { sealed, key_id }
    }
}

impl DistributedData for ConfidentialMessage {
    fn meta_data(&self) -> Option<MetaData> {
        None
    }

    // Validity of the sealed body is up to the sender and the decryptor
    fn is_data_invalid(&self) -> bool {
        false
    }
}

/// Arbitrary distributed data wrapped for signed broadcast
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AuthenticatedData<D> {
    pub data: D,
    pub meta_data: MetaData,
}

impl<D: DistributedData> AuthenticatedData<D> {
    /// Wrap `data` with the default validity window and overhead allowance
    pub fn new(data: D) -> Self {
        let meta_data = MetaData {
            ttl: DEFAULT_TTL,
            size_allowance: AUTHENTICATION_OVERHEAD,
            class_name: short_type_name::<D>().to_string(),
        };

        Self { data, meta_data }
    }

    pub const fn with_meta_data(data: D, meta_data: MetaData) -> Self {
        Self { data, meta_data }
    }
}

impl<D: DistributedData> DistributedData for AuthenticatedData<D> {
    fn meta_data(&self) -> Option<MetaData> {
        Some(self.meta_data.clone())
    }

    fn is_data_invalid(&self) -> bool {
        self.data.is_data_invalid()
    }
}

/// Data that only holders of one of a fixed set of keys may publish.
///
/// The set is an associated constant of the type, so no instance can carry
/// a different one.
pub trait AuthorizedData: DistributedData {
    /// Hex encoded public keys allowed to publish this type
    const AUTHORIZED_PUBLIC_KEYS: &'static [&'static str];

    fn is_authorized_key(public_key_hex: &str) -> bool {
        Self::AUTHORIZED_PUBLIC_KEYS
            .iter()
            .any(|key| key.eq_ignore_ascii_case(public_key_hex))
    }
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    name.rsplit("::").next().unwrap_or(name)
}
