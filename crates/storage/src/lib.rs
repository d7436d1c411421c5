//! Storage layer for the Sable L2 node.
//!
//! Three layers, bottom up:
//! - [`Database`]: byte-level key-value store with atomic batches and
//!   prefix iteration. Two backends: [`MemoryDatabase`] for tests and
//!   [`AppendLogDatabase`] for durable single-file persistence.
//! - [`StateStore`]: accounts, contract storage and code over a
//!   [`Database`], with journal-based snapshot/revert and Merkle state
//!   roots.
//! - [`BlockStore`]: blocks by number and hash, transaction and receipt
//!   indexes, chain head.

pub mod blocks;
pub mod error;
pub mod keys;
pub mod kv;
pub mod log;
pub mod state;

pub use blocks::BlockStore;
pub use error::StorageError;
pub use kv::{Database, MemoryDatabase, WriteBatch};
pub use log::AppendLogDatabase;
pub use state::{Snapshot, StateStore};

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
