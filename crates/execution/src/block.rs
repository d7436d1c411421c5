//! Block-level execution: ordered transaction application, root
//! derivation and the base-fee update rule.

use crate::context::BlockContext;
use crate::error::BlockError;
use crate::processor::TransactionProcessor;
use sable_storage::StateStore;
use sable_types::merkle::merkle_root;
use sable_types::{Block, BlockHeader, Hash, Receipt};
use tracing::{info, warn};

const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
const ELASTICITY_MULTIPLIER: u64 = 2;

/// Result of processing a block.
#[derive(Clone, Debug)]
pub struct BlockOutcome {
    pub state_root: Hash,
    pub receipts_root: Hash,
    pub receipts: Vec<Receipt>,
    pub total_gas_used: u64,
}

/// Applies ordered transactions and derives the post-block roots.
#[derive(Clone, Debug, Default)]
pub struct BlockProcessor {
    processor: TransactionProcessor,
}

impl BlockProcessor {
    pub fn new(processor: TransactionProcessor) -> Self {
        Self { processor }
    }

    pub fn transaction_processor(&self) -> &TransactionProcessor {
        &self.processor
    }

    /// Structural checks that need no state: gas cap and transactions
    /// root.
    pub fn validate_block(&self, block: &Block) -> Result<(), BlockError> {
        if block.header.gas_used > block.header.gas_limit {
            return Err(BlockError::GasCapExceeded {
                gas_used: block.header.gas_used,
                gas_limit: block.header.gas_limit,
            });
        }
        let computed = block.compute_tx_root();
        if computed != block.header.tx_root {
            return Err(BlockError::TxRootMismatch {
                header: block.header.tx_root,
                computed,
            });
        }
        Ok(())
    }

    /// Run every transaction in order, commit the state and compute the
    /// receipts root.
    ///
    /// A transaction that fails inside the VM does not invalidate the
    /// block; one that fails validation yields a zero-gas failure receipt
    /// (a correct producer never includes such a transaction). A commit
    /// failure reverts to the pre-block state and rejects the block.
    pub fn process_block(
        &self,
        state: &mut StateStore,
        block: &Block,
    ) -> Result<BlockOutcome, BlockError> {
        self.validate_block(block)?;

        let ctx = BlockContext::from_header(&block.header, self.processor.config().chain_id);
        let pre_block = state.snapshot();

        let mut receipts: Vec<Receipt> = Vec::with_capacity(block.transactions.len());
        let mut cumulative_gas = 0u64;

        for (index, tx) in block.transactions.iter().enumerate() {
            let mut receipt = match self.processor.process(state, tx, &ctx) {
                Ok(outcome) => outcome.receipt,
                Err(validation) => {
                    warn!(
                        tx = %tx.hash(),
                        index,
                        error = %validation,
                        "invalid transaction inside block"
                    );
                    Receipt {
                        tx_hash: tx.hash(),
                        block_number: block.header.number,
                        index: index as u32,
                        from: tx.from,
                        to: tx.to,
                        success: false,
                        gas_used: 0,
                        cumulative_gas_used: cumulative_gas,
                        contract_address: None,
                        logs: Vec::new(),
                    }
                }
            };

            cumulative_gas += receipt.gas_used;
            receipt.index = index as u32;
            receipt.cumulative_gas_used = cumulative_gas;
            receipts.push(receipt);
        }

        if cumulative_gas > block.header.gas_limit {
            state.revert(pre_block);
            return Err(BlockError::GasCapExceeded {
                gas_used: cumulative_gas,
                gas_limit: block.header.gas_limit,
            });
        }

        let state_root = match state.commit() {
            Ok(root) => root,
            Err(err) => {
                state.revert(pre_block);
                return Err(BlockError::Storage(err));
            }
        };

        let receipt_hashes: Vec<Hash> = receipts.iter().map(|r| r.hash()).collect();
        let receipts_root = merkle_root(&receipt_hashes);

        info!(
            number = block.header.number,
            txs = receipts.len(),
            gas = cumulative_gas,
            %state_root,
            "block processed"
        );

        Ok(BlockOutcome {
            state_root,
            receipts_root,
            receipts,
            total_gas_used: cumulative_gas,
        })
    }

    /// EIP-1559-style base fee for the block after `parent`.
    pub fn next_base_fee(parent: &BlockHeader) -> u64 {
        let target = parent.gas_limit / ELASTICITY_MULTIPLIER;
        if target == 0 || parent.gas_used == target {
            return parent.base_fee;
        }

        if parent.gas_used > target {
            let delta = parent.gas_used - target;
            let fee_delta = parent.base_fee * delta / target / BASE_FEE_CHANGE_DENOMINATOR;
            parent.base_fee + fee_delta.max(1)
        } else {
            let delta = target - parent.gas_used;
            let fee_delta = parent.base_fee * delta / target / BASE_FEE_CHANGE_DENOMINATOR;
            // Floor at zero; the subtraction below cannot wrap.
            if fee_delta >= parent.base_fee {
                0
            } else {
                parent.base_fee - fee_delta
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::address::ADDRESS_LEN;
    use sable_types::{Address, AddressKind};

    fn header(gas_limit: u64, gas_used: u64, base_fee: u64) -> BlockHeader {
        BlockHeader {
            number: 1,
            parent_hash: Hash::ZERO,
            state_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            receipts_root: Hash::ZERO,
            sequencer: Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            gas_limit,
            gas_used,
            base_fee,
            timestamp: 0,
            l1_reference: 0,
            batch_id: 0,
        }
    }

    #[test]
    fn base_fee_unchanged_at_target() {
        let parent = header(30_000_000, 15_000_000, 1_000_000_000);
        assert_eq!(BlockProcessor::next_base_fee(&parent), 1_000_000_000);
    }

    #[test]
    fn base_fee_rises_above_target() {
        // Full blocks raise the fee by 1/8.
        let parent = header(30_000_000, 30_000_000, 1_000_000_000);
        assert_eq!(BlockProcessor::next_base_fee(&parent), 1_125_000_000);
    }

    #[test]
    fn base_fee_rise_is_at_least_one() {
        let parent = header(30_000_000, 15_000_001, 1);
        assert_eq!(BlockProcessor::next_base_fee(&parent), 2);
    }

    #[test]
    fn base_fee_falls_below_target() {
        // Empty blocks cut the fee by 1/8.
        let parent = header(30_000_000, 0, 1_000_000_000);
        assert_eq!(BlockProcessor::next_base_fee(&parent), 875_000_000);
    }

    #[test]
    fn base_fee_floors_at_zero_without_wrap() {
        let parent = header(30_000_000, 0, 1);
        assert_eq!(BlockProcessor::next_base_fee(&parent), 1);
        let parent_zero = header(30_000_000, 0, 0);
        assert_eq!(BlockProcessor::next_base_fee(&parent_zero), 0);
        // Small fee with a large decrease must clamp, not wrap.
        let parent_small = header(30_000_000, 0, 7);
        assert!(BlockProcessor::next_base_fee(&parent_small) <= 7);
    }

    #[test]
    fn gas_cap_violation_rejects_block() {
        let processor = BlockProcessor::default();
        let block = Block {
            header: header(21_000, 22_000, 0),
            transactions: vec![],
        };
        assert!(matches!(
            processor.validate_block(&block),
            Err(BlockError::GasCapExceeded { .. })
        ));
    }

    #[test]
    fn tx_root_mismatch_rejects_block() {
        let processor = BlockProcessor::default();
        let mut h = header(30_000_000, 0, 0);
        h.tx_root = Hash::compute(b"wrong");
        let block = Block {
            header: h,
            transactions: vec![],
        };
        assert!(matches!(
            processor.validate_block(&block),
            Err(BlockError::TxRootMismatch { .. })
        ));
    }
}
