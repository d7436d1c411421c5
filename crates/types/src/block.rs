//! Blocks, headers and their wire codec.

use crate::address::{Address, AddressKind, ADDRESS_LEN};
use crate::codec::{CodecError, Reader, Writer};
use crate::hash::Hash;
use crate::merkle::merkle_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Fixed size of the header wire encoding.
pub const HEADER_LEN: usize = 212;

/// Block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub receipts_root: Hash,
    /// Producer of this block.
    pub sequencer: Address,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee: u64,
    pub timestamp: u64,
    /// L1 block reference at production time.
    pub l1_reference: u64,
    /// Settlement batch this block belongs to (0 while unassigned).
    pub batch_id: u64,
}

impl BlockHeader {
    /// Hash over the fixed 212-byte encoding.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode())
    }

    /// Fixed 212-byte encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN);
        w.put_u64(self.number);
        w.put_bytes(&self.parent_hash.0);
        w.put_bytes(&self.state_root.0);
        w.put_bytes(&self.tx_root.0);
        w.put_bytes(&self.receipts_root.0);
        w.put_bytes(self.sequencer.as_bytes());
        w.put_u64(self.gas_limit);
        w.put_u64(self.gas_used);
        w.put_u64(self.base_fee);
        w.put_u64(self.timestamp);
        w.put_u64(self.l1_reference);
        w.put_u64(self.batch_id);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::UnexpectedEof(bytes.len()));
        }
        let mut r = Reader::new(bytes);
        Ok(Self {
            number: r.get_u64()?,
            parent_hash: Hash(r.get_array()?),
            state_root: Hash(r.get_array()?),
            tx_root: Hash(r.get_array()?),
            receipts_root: Hash(r.get_array()?),
            sequencer: Address::new(AddressKind::PaymentOnly, r.get_array::<ADDRESS_LEN>()?),
            gas_limit: r.get_u64()?,
            gas_used: r.get_u64()?,
            base_fee: r.get_u64()?,
            timestamp: r.get_u64()?,
            l1_reference: r.get_u64()?,
            batch_id: r.get_u64()?,
        })
    }
}

/// A block: header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Merkle root over the ordered transaction hashes.
    pub fn compute_tx_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        merkle_root(&hashes)
    }

    /// `header ‖ u32 tx_count ‖ (u32 len ‖ tx_bytes)*`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(HEADER_LEN + 64 * self.transactions.len());
        w.put_bytes(&self.header.encode());
        w.put_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            w.put_len_prefixed_u32(&tx.encode());
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::UnexpectedEof(bytes.len()));
        }
        let header = BlockHeader::decode(&bytes[..HEADER_LEN])?;
        let mut r = Reader::new(&bytes[HEADER_LEN..]);

        let tx_count = r.get_u32()?;
        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let tx_bytes = r.get_len_prefixed_u32()?;
            transactions.push(Transaction::decode(tx_bytes)?);
        }

        Ok(Self {
            header,
            transactions,
        })
    }
}
