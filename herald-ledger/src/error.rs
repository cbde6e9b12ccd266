//! Error types for the herald-ledger crate.
//!
//! This module provides typed error handling for ledger persistence including
//! file I/O, serialization, and path validation.

use std::io;

use thiserror::Error;

/// Top-level ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Ledger path validation failed.
    #[error("Ledger validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error (lock poisoning, injected failures, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The file was written by an incompatible version.
    #[error("Unsupported ledger format version {found}, expected {expected}")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// Ledger data is corrupted or incomplete.
    #[error("Corrupted ledger data: {0}")]
    Corrupted(String),
}

/// Ledger path validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Path contains `..` components.
    #[error("Ledger path cannot contain '..' components: {0}")]
    ParentDir(String),

    /// Path is relative.
    #[error("Ledger path must be absolute: {0}")]
    NotAbsolute(String),

    /// Path lies inside a system directory.
    #[error("Ledger path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: String, path: String },

    /// Path names a directory rather than a file.
    #[error("Ledger path is a directory: {0}")]
    IsDirectory(String),
}

/// Specialized `Result` type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Serialization(e.into())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Serialization(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: LedgerError = io_err.into();
        assert!(matches!(err, LedgerError::Io(_)));
    }

    #[test]
    fn test_version_error_message() {
        let err = LedgerError::from(SerializationError::UnsupportedVersion {
            found: 9,
            expected: 1,
        });
        assert!(err.to_string().contains("version 9"));
    }
}
