//! Per-account state.

use crate::codec::{CodecError, Reader, Writer};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Fixed size of the account-state wire encoding.
pub const ACCOUNT_STATE_LEN: usize = 80;

/// State held for one account. An absent account is the zero value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: u64,
    pub storage_root: Hash,
    pub code_hash: Hash,
}

impl AccountState {
    /// An account is a contract iff its code hash is non-zero.
    pub fn is_contract(&self) -> bool {
        !self.code_hash.is_zero()
    }

    /// True when every field is the zero value (logically absent).
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance == 0
            && self.storage_root.is_zero()
            && self.code_hash.is_zero()
    }

    /// `u64 nonce ‖ u64 balance ‖ storage_root ‖ code_hash` (80 bytes).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(ACCOUNT_STATE_LEN);
        w.put_u64(self.nonce);
        w.put_u64(self.balance);
        w.put_bytes(&self.storage_root.0);
        w.put_bytes(&self.code_hash.0);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != ACCOUNT_STATE_LEN {
            return Err(CodecError::InvalidSize {
                expected: ACCOUNT_STATE_LEN,
                got: bytes.len(),
            });
        }
        let mut r = Reader::new(bytes);
        Ok(Self {
            nonce: r.get_u64()?,
            balance: r.get_u64()?,
            storage_root: Hash(r.get_array()?),
            code_hash: Hash(r.get_array()?),
        })
    }
}
