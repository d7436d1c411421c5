//! Genesis bootstrap.

use crate::error::NodeError;
use sable_storage::{BlockStore, StateStore};
use sable_types::{Block, Genesis};
use tracing::info;

/// Apply the genesis allocation and seal block 0, unless the chain
/// already has a head (restart).
pub fn bootstrap(
    genesis: &Genesis,
    state: &mut StateStore,
    blocks: &BlockStore,
) -> Result<Block, NodeError> {
    if let Some(head) = blocks.head_block()? {
        info!(head = head.number(), "existing chain found, skipping genesis");
        return Ok(head);
    }

    for (addr, balance) in &genesis.alloc {
        state.add_balance(addr, *balance);
    }
    let state_root = state.commit()?;

    let block = genesis.build_block(state_root);
    blocks.store_block(&block)?;
    info!(%state_root, accounts = genesis.alloc.len(), "genesis sealed");
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_storage::MemoryDatabase;
    use sable_types::{Address, AddressKind};
    use std::sync::Arc;

    #[test]
    fn funds_allocations_and_seals_block_zero() {
        let db = Arc::new(MemoryDatabase::new());
        let mut state = StateStore::open(db.clone()).unwrap();
        let blocks = BlockStore::open(db).unwrap();

        let account = Address::new(AddressKind::PaymentOnly, [1u8; 28]);
        let genesis = Genesis {
            alloc: vec![(account, 10u64.pow(19))],
            ..Default::default()
        };

        let block = bootstrap(&genesis, &mut state, &blocks).unwrap();
        assert_eq!(block.number(), 0);
        assert_eq!(state.get_balance(&account), 10u64.pow(19));
        assert_eq!(blocks.head(), Some(0));

        // A second bootstrap is a no-op returning the existing head.
        let again = bootstrap(&genesis, &mut state, &blocks).unwrap();
        assert_eq!(again.hash(), block.hash());
        assert_eq!(state.get_balance(&account), 10u64.pow(19));
    }
}
