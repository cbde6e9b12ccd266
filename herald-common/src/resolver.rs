//! Decoding of wire payloads into distributed data, keyed by type name.

use std::fmt::{self, Debug};

use ahash::AHashMap;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::envelope::DistributedData;

pub type Resolved = Box<dyn DistributedData + Send + Sync>;

type DecodeFn = Box<dyn Fn(&[u8]) -> Result<Resolved, bincode::error::DecodeError> + Send + Sync>;

/// Failure to turn a wire payload into a known type.
///
/// Never retried by the delivery layer.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No decoder is registered under this name.
    #[error("Unresolvable payload of type {type_name}")]
    Unresolvable { type_name: String },

    /// A decoder exists but the bytes are malformed.
    #[error("Unresolvable payload of type {type_name}: {reason}")]
    Decode { type_name: String, reason: String },
}

#[derive(Default)]
pub struct ResolverRegistry {
    decoders: AHashMap<String, DecodeFn>,
}

impl Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry")
            .field("types", &names)
            .finish()
    }
}

impl ResolverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bincode decoder for `T` under `type_name`, replacing any
    /// previous decoder for that name
    pub fn register<T>(&mut self, type_name: impl Into<String>)
    where
        T: DistributedData + DeserializeOwned + Send + Sync + 'static,
    {
        self.decoders.insert(
            type_name.into(),
            Box::new(|bytes: &[u8]| {
                let (value, _): (T, usize) =
                    bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
                Ok(Box::new(value) as Resolved)
            }),
        );
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode `bytes` as the type registered under `type_name`
    ///
    /// # Errors
    /// [`ResolveError::Unresolvable`] when nothing is registered under the
    /// name, [`ResolveError::Decode`] when the bytes do not decode
    pub fn resolve(&self, type_name: &str, bytes: &[u8]) -> Result<Resolved, ResolveError> {
        let decode = self
            .decoders
            .get(type_name)
            .ok_or_else(|| ResolveError::Unresolvable {
                type_name: type_name.to_string(),
            })?;

        decode(bytes).map_err(|e| ResolveError::Decode {
            type_name: type_name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ConfidentialMessage, SealedData};

    fn message() -> ConfidentialMessage {
        ConfidentialMessage::new(
            SealedData {
                sender_public_key: vec![1, 2],
                hmac: vec![3],
                iv: vec![4],
                cipher_text: vec![5, 6, 7],
                signature: vec![8],
            },
            "key".to_string(),
        )
    }

    #[test]
    fn resolves_registered_type() {
        let mut registry = ResolverRegistry::new();
        registry.register::<ConfidentialMessage>("ConfidentialMessage");

        let bytes = bincode::serde::encode_to_vec(message(), bincode::config::standard())
            .expect("encode");
        let resolved = registry
            .resolve("ConfidentialMessage", &bytes)
            .expect("registered type should resolve");

        assert!(!resolved.is_data_invalid());
    }

    #[test]
    fn unknown_type_is_unresolvable() {
        let registry = ResolverRegistry::new();
        let err = registry.resolve("PublicChatMessage", &[]).err();

        assert!(matches!(
            err,
            Some(ResolveError::Unresolvable { ref type_name }) if type_name == "PublicChatMessage"
        ));
    }

    #[test]
    fn malformed_bytes_fail_fast() {
        let mut registry = ResolverRegistry::new();
        registry.register::<ConfidentialMessage>("ConfidentialMessage");

        let err = registry.resolve("ConfidentialMessage", &[0xff]).err();
        assert!(matches!(err, Some(ResolveError::Decode { .. })));
    }
}
