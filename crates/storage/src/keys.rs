//! KV key layout.
//!
//! One flat keyspace partitioned by short prefixes:
//!
//! | prefix | entry |
//! |---|---|
//! | `0x01 ‖ digest` | account-trie entry (`digest = hash(addr)`) |
//! | `BN ‖ u64` | block by number |
//! | `BH ‖ digest` | block number by block hash |
//! | `TXI ‖ digest` | `u64 block ‖ u32 index` for a transaction hash |
//! | `RCT ‖ digest` | receipt by transaction hash |
//! | `STOR ‖ addr ‖ slot` | contract storage slot |
//! | `CODE ‖ digest` | contract code by code hash |
//! | `HEAD` | chain head number |
//! | `BATCHSEQ` | next settlement batch id |

use sable_types::address::ADDRESS_LEN;
use sable_types::{Address, Hash};

pub const ACCOUNT_PREFIX: &[u8] = &[0x01];
pub const BLOCK_BY_NUMBER_PREFIX: &[u8] = b"BN";
pub const BLOCK_BY_HASH_PREFIX: &[u8] = b"BH";
pub const TX_INDEX_PREFIX: &[u8] = b"TXI";
pub const RECEIPT_PREFIX: &[u8] = b"RCT";
pub const STORAGE_PREFIX: &[u8] = b"STOR";
pub const CODE_PREFIX: &[u8] = b"CODE";
pub const HEAD_KEY: &[u8] = b"HEAD";
pub const BATCH_SEQ_KEY: &[u8] = b"BATCHSEQ";

pub fn account_key(addr: &Address) -> Vec<u8> {
    let digest = Hash::compute(addr.as_bytes());
    let mut key = Vec::with_capacity(1 + 32);
    key.extend_from_slice(ACCOUNT_PREFIX);
    key.extend_from_slice(&digest.0);
    key
}

pub fn block_by_number_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 8);
    key.extend_from_slice(BLOCK_BY_NUMBER_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

pub fn block_by_hash_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 32);
    key.extend_from_slice(BLOCK_BY_HASH_PREFIX);
    key.extend_from_slice(&hash.0);
    key
}

pub fn tx_index_key(tx_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(3 + 32);
    key.extend_from_slice(TX_INDEX_PREFIX);
    key.extend_from_slice(&tx_hash.0);
    key
}

pub fn receipt_key(tx_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(3 + 32);
    key.extend_from_slice(RECEIPT_PREFIX);
    key.extend_from_slice(&tx_hash.0);
    key
}

pub fn storage_key(addr: &Address, slot: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + ADDRESS_LEN + 32);
    key.extend_from_slice(STORAGE_PREFIX);
    key.extend_from_slice(addr.as_bytes());
    key.extend_from_slice(&slot.0);
    key
}

pub fn code_key(code_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + 32);
    key.extend_from_slice(CODE_PREFIX);
    key.extend_from_slice(&code_hash.0);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::AddressKind;

    #[test]
    fn keys_are_disjoint_by_prefix() {
        let addr = Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]);
        let h = Hash::compute(b"h");
        let keys = [
            account_key(&addr),
            block_by_number_key(1),
            block_by_hash_key(&h),
            tx_index_key(&h),
            receipt_key(&h),
            storage_key(&addr, &h),
            code_key(&h),
        ];
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn block_number_keys_sort_numerically() {
        assert!(block_by_number_key(1) < block_by_number_key(2));
        assert!(block_by_number_key(255) < block_by_number_key(256));
    }
}
