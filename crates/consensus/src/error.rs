//! Consensus error types.

use sable_types::{Address, Hash};
use thiserror::Error;

/// Block and registry rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("block number {got} does not extend head {head}")]
    WrongNumber { head: u64, got: u64 },

    #[error("parent hash mismatch: expected {expected}, got {got}")]
    ParentMismatch { expected: Hash, got: Hash },

    #[error("sequencer {got} is not the leader for slot {slot} (expected {expected})")]
    WrongLeader {
        slot: u64,
        expected: Address,
        got: Address,
    },

    #[error("invalid sequencer signature on header {0}")]
    BadSignature(Hash),

    #[error("transactions root mismatch")]
    TxRootMismatch,

    #[error("gas used {gas_used} exceeds limit {gas_limit}")]
    GasCapExceeded { gas_used: u64, gas_limit: u64 },

    #[error("chain diverges from L1 checkpoint at block {0}")]
    CheckpointViolation(u64),

    #[error("stake {stake} below the {min_stake} minimum")]
    StakeTooLow { stake: u64, min_stake: u64 },

    #[error("sequencer {0} is not registered")]
    UnknownSequencer(Address),

    #[error("no active sequencers")]
    EmptyActiveSet,
}
