//! Core types for the Sable L2 node.
//!
//! This crate defines the data model shared by every subsystem: hashes,
//! addresses, transactions, blocks, receipts, account state, settlement
//! records and the sequencer registry entries. All consensus-critical wire
//! encodings live next to their types so that `decode(encode(x)) == x` is a
//! local property of each module.

pub mod account;
pub mod address;
pub mod block;
pub mod codec;
pub mod genesis;
pub mod hash;
pub mod merkle;
pub mod receipt;
pub mod sequencer;
pub mod settlement;
pub mod transaction;

pub use account::AccountState;
pub use address::{Address, AddressKind};
pub use block::{Block, BlockHeader};
pub use codec::{CodecError, Reader, Writer};
pub use genesis::Genesis;
pub use hash::Hash;
pub use merkle::{merkle_proof, merkle_root, verify_merkle_proof};
pub use receipt::{Log, Receipt};
pub use sequencer::{Sequencer, SequencerStatus};
pub use settlement::{SettlementRecord, SettlementStatus};
pub use transaction::Transaction;
