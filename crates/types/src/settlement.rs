//! Settlement records anchoring L2 blocks to the L1 ledger.

use crate::codec::{CodecError, Reader, Writer};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a settlement record.
///
/// ```text
/// Pending -> Submitted -> Finalized
///               |
///               +-> Challenged -> Reverted | Finalized
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SettlementStatus {
    /// Built, not yet accepted by the L1 submitter.
    Pending = 0,
    /// On L1, inside the challenge window.
    Submitted = 1,
    /// Challenge window elapsed without dispute.
    Finalized = 2,
    /// Under dispute; frozen until resolution.
    Challenged = 3,
    /// Dispute upheld; later L2 history is truncated.
    Reverted = 4,
}

impl SettlementStatus {
    pub fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Submitted),
            2 => Ok(Self::Finalized),
            3 => Ok(Self::Challenged),
            4 => Ok(Self::Reverted),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Finalized => "finalized",
            Self::Challenged => "challenged",
            Self::Reverted => "reverted",
        };
        f.write_str(s)
    }
}

/// A contiguous range of blocks with pre/post state commitments, bound for
/// the L1 settlement contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub batch_id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub pre_state_root: Hash,
    pub post_state_root: Hash,
    /// Merkle root over the batch's block-header hashes.
    pub tx_root: Hash,
    /// Length-prefixed concatenation of the block encodings.
    #[serde(skip)]
    pub compressed_blocks: Vec<u8>,
    pub status: SettlementStatus,
}

impl SettlementRecord {
    /// Commitment binding over the record's roots and range. This is a
    /// Merkle commitment, not a succinct argument; verification recomputes
    /// the hash over the same fields.
    pub fn commitment(&self) -> Hash {
        let mut w = Writer::with_capacity(88);
        w.put_u64(self.batch_id);
        w.put_u64(self.start_block);
        w.put_u64(self.end_block);
        w.put_bytes(&self.pre_state_root.0);
        w.put_bytes(&self.post_state_root.0);
        w.put_bytes(&self.tx_root.0);
        Hash::compute(&w.into_bytes())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(128 + self.compressed_blocks.len());
        w.put_u64(self.batch_id);
        w.put_u64(self.start_block);
        w.put_u64(self.end_block);
        w.put_bytes(&self.pre_state_root.0);
        w.put_bytes(&self.post_state_root.0);
        w.put_bytes(&self.tx_root.0);
        w.put_len_prefixed(&self.compressed_blocks);
        w.put_u8(self.status as u8);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        Ok(Self {
            batch_id: r.get_u64()?,
            start_block: r.get_u64()?,
            end_block: r.get_u64()?,
            pre_state_root: Hash(r.get_array()?),
            post_state_root: Hash(r.get_array()?),
            tx_root: Hash(r.get_array()?),
            compressed_blocks: r.get_len_prefixed()?.to_vec(),
            status: SettlementStatus::from_byte(r.get_u8()?)?,
        })
    }
}
