//! Backend storage implementations for the ledger
//!
//! This module contains different backing store implementations:
//! - `memory`: In-memory storage for testing and ephemeral nodes
//! - `test`: Test utilities with synchronization primitives
//! - `file`: Single-file storage for production use

pub mod file;
pub mod memory;

pub use file::{FileBackingStore, FileBackingStoreBuilder};
pub use memory::MemoryBackingStore;
pub use test::TestBackingStore;
