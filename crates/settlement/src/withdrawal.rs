//! L2-to-L1 withdrawal queue entries.

use sable_types::{Address, Hash};
use serde::{Deserialize, Serialize};

/// Lifecycle of a withdrawal claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Waiting for its batch to finalize.
    Pending,
    /// The referencing batch finalized; claimable on L1.
    Claimable,
    /// The referencing batch was reverted.
    Reverted,
}

/// A withdrawal initiated on L2, claimable on L1 once its batch
/// finalizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub l2_tx_hash: Hash,
    pub l2_block_number: u64,
    pub sender: Address,
    pub amount: u64,
    /// Settlement batch whose finality gates this claim.
    pub batch_id: u64,
    pub status: WithdrawalStatus,
}

impl Withdrawal {
    pub fn new(
        l2_tx_hash: Hash,
        l2_block_number: u64,
        sender: Address,
        amount: u64,
        batch_id: u64,
    ) -> Self {
        Self {
            l2_tx_hash,
            l2_block_number,
            sender,
            amount,
            batch_id,
            status: WithdrawalStatus::Pending,
        }
    }
}
