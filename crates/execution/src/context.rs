//! Execution contexts handed from block processing into the VM.

use sable_types::{Address, BlockHeader, Hash};

/// Block-level environment visible to executing code.
#[derive(Clone, Debug)]
pub struct BlockContext {
    pub block_number: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub base_fee: u64,
    pub chain_id: u64,
    pub coinbase: Address,
    /// Hash of the parent header, served by BLOCKHASH for `number - 1`.
    pub parent_hash: Hash,
}

impl BlockContext {
    /// Context for executing the transactions of `header`.
    pub fn from_header(header: &BlockHeader, chain_id: u64) -> Self {
        Self {
            block_number: header.number,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            base_fee: header.base_fee,
            chain_id,
            coinbase: header.sequencer,
            parent_hash: header.parent_hash,
        }
    }
}

/// Transaction-level environment: fixed for every frame of one transaction.
#[derive(Clone, Debug)]
pub struct TxContext {
    /// Original external sender.
    pub origin: Address,
    /// Effective gas price paid by this transaction.
    pub gas_price: u64,
}
