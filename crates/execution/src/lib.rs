//! Execution layer for the Sable L2 node.
//!
//! A stack-based, gas-metered interpreter over 256-bit words
//! ([`vm::Vm`]), the per-transaction processor ([`processor`]) and the
//! block processor ([`block`]) that derives state and receipts roots.

pub mod block;
pub mod context;
pub mod error;
pub mod gas;
pub mod opcode;
pub mod precompiles;
pub mod processor;
pub mod vm;

pub use block::{BlockOutcome, BlockProcessor};
pub use context::BlockContext;
pub use error::{BlockError, ValidationError, VmError};
pub use processor::{ProcessedTransaction, ProcessorConfig, TransactionProcessor};
pub use vm::{FrameOutcome, FrameResult, Vm};
