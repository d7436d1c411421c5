//! Node error types.

use sable_consensus::ConsensusError;
use sable_execution::{BlockError, ValidationError};
use sable_settlement::SettlementError;
use sable_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// This node is not the scheduled producer for the slot.
    #[error("not the leader for slot {0}")]
    NotOurSlot(u64),

    /// Production requested on a node without a sequencer key.
    #[error("no sequencer key configured")]
    NoSequencerKey,

    /// Chain has no head yet (genesis not bootstrapped).
    #[error("chain not initialized")]
    NotInitialized,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
