//! Execution error taxonomy.
//!
//! Three tiers: [`VmError`] aborts a call frame, [`ValidationError`] rejects
//! a transaction before execution, [`BlockError`] rejects a whole block.

use sable_storage::StorageError;
use sable_types::Hash;
use thiserror::Error;

/// Faults raised inside the interpreter. Each aborts the current frame;
/// the caller treats the transaction as failed with gas burned and the
/// frame's state changes undone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("jump to invalid destination {0}")]
    BadJump(usize),

    #[error("state mutation inside a static call")]
    StaticViolation,

    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),

    #[error("balance underflow")]
    BalanceUnderflow,

    /// Explicit REVERT with the returned data window.
    #[error("execution reverted ({} bytes)", .0.len())]
    Revert(Vec<u8>),

    /// Underlying store failed mid-frame; the operation fails and the
    /// error is surfaced through the receipt.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl VmError {
    /// Category string recorded in receipts.
    pub fn category(&self) -> &'static str {
        match self {
            Self::OutOfGas => "out_of_gas",
            Self::StackUnderflow => "stack_underflow",
            Self::StackOverflow => "stack_overflow",
            Self::BadJump(_) => "bad_jump",
            Self::StaticViolation => "static_violation",
            Self::InvalidOpcode(_) => "invalid_opcode",
            Self::BalanceUnderflow => "balance_underflow",
            Self::Revert(_) => "revert",
            Self::Storage(_) => "storage",
        }
    }
}

/// Pre-execution rejection, returned to the submitter as a typed outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },

    #[error("max fee {max_fee} below base fee {base_fee}")]
    FeeTooLow { max_fee: u64, base_fee: u64 },

    #[error("gas limit {gas_limit} below intrinsic gas {intrinsic}")]
    IntrinsicTooLow { gas_limit: u64, intrinsic: u64 },

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("bad signature")]
    BadSignature,
}

/// Whole-block rejection. No state mutation persists.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("gas used {gas_used} exceeds gas limit {gas_limit}")]
    GasCapExceeded { gas_used: u64, gas_limit: u64 },

    #[error("transactions root mismatch: header {header}, computed {computed}")]
    TxRootMismatch { header: Hash, computed: Hash },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
