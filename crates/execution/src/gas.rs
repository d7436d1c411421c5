//! Gas schedule.
//!
//! Baseline tiers follow the conventional schedule; dynamic costs (memory
//! expansion, copies, logs, hashing) are computed by the helpers below.

use sable_types::Transaction;

pub const ZERO: u64 = 0;
pub const BASE: u64 = 2;
pub const VERYLOW: u64 = 3;
pub const LOW: u64 = 5;
pub const MID: u64 = 8;
pub const HIGH: u64 = 10;

pub const JUMPDEST: u64 = 1;
pub const SLOAD: u64 = 800;
pub const SSTORE_SET: u64 = 20_000;
pub const SSTORE_RESET: u64 = 5_000;
pub const BALANCE: u64 = 700;
pub const EXTCODE: u64 = 700;
pub const CALL: u64 = 700;
pub const CALL_VALUE: u64 = 9_000;
pub const CALL_NEW_ACCOUNT: u64 = 25_000;
pub const CREATE: u64 = 32_000;
pub const SELFDESTRUCT: u64 = 5_000;
pub const EXP: u64 = 10;
pub const EXP_BYTE: u64 = 50;
pub const SHA3: u64 = 30;
pub const SHA3_WORD: u64 = 6;
pub const COPY_WORD: u64 = 3;
pub const LOG: u64 = 375;
pub const LOG_TOPIC: u64 = 375;
pub const LOG_DATA_BYTE: u64 = 8;
pub const MEMORY_WORD: u64 = 3;

pub const TX_BASE: u64 = 21_000;
pub const TX_CREATE: u64 = 32_000;
pub const TX_DATA_ZERO: u64 = 4;
pub const TX_DATA_NONZERO: u64 = 16;

/// Minimum gas a transaction must carry before any bytecode runs.
pub fn intrinsic_gas(tx: &Transaction) -> u64 {
    let mut gas = TX_BASE;
    if tx.is_create() {
        gas += TX_CREATE;
    }
    for byte in &tx.data {
        gas += if *byte == 0 { TX_DATA_ZERO } else { TX_DATA_NONZERO };
    }
    gas
}

/// Cost of growing memory from `current_words` to `new_words` (32-byte
/// words): `3·w + w²/512` charged on the delta beyond the previous peak.
pub fn memory_expansion_cost(current_words: u64, new_words: u64) -> u64 {
    if new_words <= current_words {
        return 0;
    }
    total_memory_cost(new_words).saturating_sub(total_memory_cost(current_words))
}

fn total_memory_cost(words: u64) -> u64 {
    MEMORY_WORD
        .saturating_mul(words)
        .saturating_add(words.saturating_mul(words) / 512)
}

/// Per-word cost helper for copy-style opcodes.
pub fn copy_cost(len: u64) -> u64 {
    COPY_WORD * len.div_ceil(32)
}

/// Dynamic cost of SHA3 over `len` bytes.
pub fn sha3_cost(len: u64) -> u64 {
    SHA3 + SHA3_WORD * len.div_ceil(32)
}

/// Cost of a LOG with `topics` topics over `len` bytes of data.
pub fn log_cost(topics: u64, len: u64) -> u64 {
    LOG + LOG_TOPIC * topics + LOG_DATA_BYTE * len
}

/// Per-byte surcharge for EXP on the exponent's significant bytes.
pub fn exp_cost(exponent_bytes: u64) -> u64 {
    EXP + EXP_BYTE * exponent_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::address::ADDRESS_LEN;
    use sable_types::transaction::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
    use sable_types::{Address, AddressKind};

    fn tx(to: Address, data: Vec<u8>) -> Transaction {
        Transaction {
            from: Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            to,
            value: 0,
            nonce: 0,
            data,
            gas_limit: 100_000,
            max_fee: 1,
            priority_fee: 0,
            sender_pubkey: [0u8; PUBLIC_KEY_LEN],
            signature: [0u8; SIGNATURE_LEN],
        }
    }

    #[test]
    fn plain_transfer_costs_21000() {
        let t = tx(Address::new(AddressKind::PaymentOnly, [2u8; ADDRESS_LEN]), vec![]);
        assert_eq!(intrinsic_gas(&t), 21_000);
    }

    #[test]
    fn data_bytes_priced_by_content() {
        let t = tx(
            Address::new(AddressKind::PaymentOnly, [2u8; ADDRESS_LEN]),
            vec![0, 0, 1, 2],
        );
        assert_eq!(intrinsic_gas(&t), 21_000 + 2 * 4 + 2 * 16);
    }

    #[test]
    fn creation_adds_surcharge() {
        let t = tx(Address::ZERO, vec![]);
        assert_eq!(intrinsic_gas(&t), 21_000 + 32_000);
    }

    #[test]
    fn memory_expansion_is_quadratic_on_delta() {
        assert_eq!(memory_expansion_cost(0, 0), 0);
        assert_eq!(memory_expansion_cost(0, 1), 3);
        assert_eq!(memory_expansion_cost(1, 1), 0);
        // 3*32 + 32*32/512 = 96 + 2 = 98
        assert_eq!(memory_expansion_cost(0, 32), 98);
        // Growing 16 -> 32 charges only the delta.
        let full = memory_expansion_cost(0, 32);
        let first = memory_expansion_cost(0, 16);
        assert_eq!(memory_expansion_cost(16, 32), full - first);
    }

    #[test]
    fn log_cost_counts_topics_and_bytes() {
        assert_eq!(log_cost(0, 0), 375);
        assert_eq!(log_cost(2, 10), 375 + 750 + 80);
    }
}
