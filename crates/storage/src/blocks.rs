//! Block storage, indexes and chain head.

use crate::error::StorageError;
use crate::keys;
use crate::kv::{Database, WriteBatch};
use crate::Result;
use parking_lot::RwLock;
use sable_types::{Block, Hash, Receipt};
use std::sync::Arc;
use tracing::debug;

/// Blocks by number and hash, plus transaction and receipt indexes.
///
/// Writes happen only at block commit; reads are concurrent.
pub struct BlockStore {
    db: Arc<dyn Database>,
    head: RwLock<Option<u64>>,
}

impl BlockStore {
    /// Open the store, recovering the head pointer if present.
    pub fn open(db: Arc<dyn Database>) -> Result<Self> {
        let head = match db.get(keys::HEAD_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                Some(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
            }
            _ => None,
        };
        Ok(Self {
            db,
            head: RwLock::new(head),
        })
    }

    /// Store a block under both indexes and advance the head when the block
    /// extends the chain. All writes land in one atomic batch.
    pub fn store_block(&self, block: &Block) -> Result<()> {
        let number = block.number();
        let hash = block.hash();
        let mut head = self.head.write();

        let mut batch = WriteBatch::new();
        batch.put(keys::block_by_number_key(number), block.encode());
        batch.put(keys::block_by_hash_key(&hash), number.to_be_bytes().to_vec());

        let advances = head.map_or(true, |h| number > h);
        if advances {
            batch.put(keys::HEAD_KEY.to_vec(), number.to_be_bytes().to_vec());
        }
        self.db.write_batch(batch)?;

        if advances {
            *head = Some(number);
        }
        debug!(number, %hash, "block stored");
        Ok(())
    }

    pub fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let key = keys::block_by_number_key(number);
        match self.db.get(&key)? {
            Some(bytes) => Ok(Some(
                Block::decode(&bytes).map_err(|e| StorageError::corrupt(&key, e))?,
            )),
            None => Ok(None),
        }
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        match self.db.get(&keys::block_by_hash_key(hash))? {
            Some(bytes) if bytes.len() == 8 => {
                let number = u64::from_be_bytes(bytes.try_into().expect("8 bytes"));
                self.get_block(number)
            }
            _ => Ok(None),
        }
    }

    /// Highest stored block number; `None` before genesis.
    pub fn head(&self) -> Option<u64> {
        *self.head.read()
    }

    /// The block at the head pointer.
    pub fn head_block(&self) -> Result<Option<Block>> {
        match self.head() {
            Some(number) => self.get_block(number),
            None => Ok(None),
        }
    }

    /// Record where a transaction landed: `tx_hash -> (block, index)`.
    pub fn index_transaction(&self, tx_hash: &Hash, block_number: u64, index: u32) -> Result<()> {
        let mut value = Vec::with_capacity(12);
        value.extend_from_slice(&block_number.to_be_bytes());
        value.extend_from_slice(&index.to_be_bytes());
        self.db.put(&keys::tx_index_key(tx_hash), &value)?;
        Ok(())
    }

    pub fn tx_location(&self, tx_hash: &Hash) -> Result<Option<(u64, u32)>> {
        match self.db.get(&keys::tx_index_key(tx_hash))? {
            Some(bytes) if bytes.len() == 12 => {
                let block = u64::from_be_bytes(bytes[..8].try_into().expect("8 bytes"));
                let index = u32::from_be_bytes(bytes[8..].try_into().expect("4 bytes"));
                Ok(Some((block, index)))
            }
            _ => Ok(None),
        }
    }

    pub fn store_receipt(&self, receipt: &Receipt) -> Result<()> {
        self.db
            .put(&keys::receipt_key(&receipt.tx_hash), &receipt.encode())?;
        Ok(())
    }

    pub fn get_receipt(&self, tx_hash: &Hash) -> Result<Option<Receipt>> {
        let key = keys::receipt_key(tx_hash);
        match self.db.get(&key)? {
            Some(bytes) => Ok(Some(
                Receipt::decode(&bytes).map_err(|e| StorageError::corrupt(&key, e))?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryDatabase;
    use sable_types::address::ADDRESS_LEN;
    use sable_types::{Address, AddressKind, BlockHeader};

    fn block(number: u64, parent: Hash) -> Block {
        Block {
            header: BlockHeader {
                number,
                parent_hash: parent,
                state_root: Hash::compute(b"state"),
                tx_root: Hash::ZERO,
                receipts_root: Hash::ZERO,
                sequencer: Address::new(AddressKind::PaymentOnly, [7u8; ADDRESS_LEN]),
                gas_limit: 30_000_000,
                gas_used: 0,
                base_fee: 1_000_000_000,
                timestamp: number * 1000,
                l1_reference: 0,
                batch_id: 0,
            },
            transactions: vec![],
        }
    }

    #[test]
    fn store_and_fetch_by_number_and_hash() {
        let store = BlockStore::open(Arc::new(MemoryDatabase::new())).unwrap();
        let b = block(1, Hash::ZERO);
        store.store_block(&b).unwrap();

        assert_eq!(store.get_block(1).unwrap().unwrap(), b);
        assert_eq!(store.get_block_by_hash(&b.hash()).unwrap().unwrap(), b);
        assert_eq!(store.get_block(2).unwrap(), None);
    }

    #[test]
    fn head_advances_monotonically() {
        let store = BlockStore::open(Arc::new(MemoryDatabase::new())).unwrap();
        assert_eq!(store.head(), None);

        store.store_block(&block(0, Hash::ZERO)).unwrap();
        assert_eq!(store.head(), Some(0));
        let b1 = block(1, Hash::ZERO);
        store.store_block(&b1).unwrap();
        assert_eq!(store.head(), Some(1));

        // Re-storing an older block does not move the head back.
        store.store_block(&block(0, Hash::ZERO)).unwrap();
        assert_eq!(store.head(), Some(1));
        assert_eq!(store.head_block().unwrap().unwrap(), b1);
    }

    #[test]
    fn head_survives_reopen() {
        let db = Arc::new(MemoryDatabase::new());
        {
            let store = BlockStore::open(db.clone()).unwrap();
            store.store_block(&block(5, Hash::ZERO)).unwrap();
        }
        let store = BlockStore::open(db).unwrap();
        assert_eq!(store.head(), Some(5));
    }

    #[test]
    fn transaction_index_round_trip() {
        let store = BlockStore::open(Arc::new(MemoryDatabase::new())).unwrap();
        let tx_hash = Hash::compute(b"tx");
        store.index_transaction(&tx_hash, 9, 4).unwrap();
        assert_eq!(store.tx_location(&tx_hash).unwrap(), Some((9, 4)));
        assert_eq!(store.tx_location(&Hash::compute(b"other")).unwrap(), None);
    }

    #[test]
    fn receipt_round_trip() {
        let store = BlockStore::open(Arc::new(MemoryDatabase::new())).unwrap();
        let receipt = Receipt {
            tx_hash: Hash::compute(b"tx"),
            block_number: 3,
            index: 0,
            from: Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            to: Address::new(AddressKind::PaymentOnly, [2u8; ADDRESS_LEN]),
            success: true,
            gas_used: 21_000,
            cumulative_gas_used: 21_000,
            contract_address: None,
            logs: vec![],
        };
        store.store_receipt(&receipt).unwrap();
        let loaded = store.get_receipt(&receipt.tx_hash).unwrap().unwrap();
        assert_eq!(loaded.gas_used, 21_000);
        assert!(loaded.success);
    }
}
