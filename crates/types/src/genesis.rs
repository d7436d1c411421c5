//! Genesis configuration.

use crate::address::Address;
use crate::block::{Block, BlockHeader};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Chain bootstrap parameters: pre-funded accounts and the block-0 header
/// fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub chain_id: u64,
    /// Pre-funded balances applied before block 0 is sealed.
    pub alloc: Vec<(Address, u64)>,
    pub gas_limit: u64,
    pub base_fee: u64,
    pub timestamp: u64,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            chain_id: 1,
            alloc: Vec::new(),
            gas_limit: 30_000_000,
            base_fee: 1_000_000_000,
            timestamp: 0,
        }
    }
}

impl Genesis {
    /// Seal the genesis block from the post-allocation state root.
    pub fn build_block(&self, state_root: Hash) -> Block {
        Block {
            header: BlockHeader {
                number: 0,
                parent_hash: Hash::ZERO,
                state_root,
                tx_root: Hash::ZERO,
                receipts_root: Hash::ZERO,
                sequencer: Address::ZERO,
                gas_limit: self.gas_limit,
                gas_used: 0,
                base_fee: self.base_fee,
                timestamp: self.timestamp,
                l1_reference: 0,
                batch_id: 0,
            },
            transactions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_links_from_zero() {
        let genesis = Genesis::default();
        let block = genesis.build_block(Hash::compute(b"root"));
        assert_eq!(block.header.number, 0);
        assert_eq!(block.header.parent_hash, Hash::ZERO);
        assert_eq!(block.header.base_fee, 1_000_000_000);
        assert!(block.transactions.is_empty());
    }
}
