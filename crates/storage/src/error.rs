//! Storage error types.

use sable_types::{Address, CodecError, Hash};
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Balance subtraction would underflow.
    #[error("balance underflow for {address}: balance {balance}, requested {requested}")]
    BalanceUnderflow {
        address: Address,
        balance: u64,
        requested: u64,
    },

    /// Block not found by number.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// Block not found by hash.
    #[error("block not found with hash {0}")]
    BlockNotFoundByHash(Hash),

    /// Receipt not found for a transaction hash.
    #[error("receipt not found for transaction {0}")]
    ReceiptNotFound(Hash),

    /// Stored bytes failed to decode.
    #[error("corrupt entry under key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Underlying file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn corrupt(key: &[u8], source: CodecError) -> Self {
        Self::Corrupt {
            key: hex::encode(key),
            source,
        }
    }
}
