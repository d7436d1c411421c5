//! Signed transactions and their wire codec.

use crate::address::{Address, AddressKind, ADDRESS_LEN};
use crate::codec::{CodecError, Reader, Writer};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Length of an Ed25519 public key on the wire.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an Ed25519 signature on the wire.
pub const SIGNATURE_LEN: usize = 64;

/// An EIP-1559-style transaction with an Ed25519 authorization.
///
/// `to == Address::ZERO` denotes contract creation with `data` as init code.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub value: u64,
    pub nonce: u64,
    #[serde(with = "serde_bytes_hex")]
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub max_fee: u64,
    pub priority_fee: u64,
    pub sender_pubkey: [u8; PUBLIC_KEY_LEN],
    #[serde(with = "serde_sig_hex")]
    pub signature: [u8; SIGNATURE_LEN],
}

impl Transaction {
    /// True when this transaction creates a contract.
    pub fn is_create(&self) -> bool {
        self.to.is_zero()
    }

    /// The bytes covered by the signature: every field except `signature`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(128 + self.data.len());
        self.encode_unsigned(&mut w);
        w.into_bytes()
    }

    /// Deterministic transaction hash, excluding the signature so the
    /// signature can be verified against it.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.signing_payload())
    }

    /// `min(max_fee, base_fee + priority_fee)`.
    pub fn effective_gas_price(&self, base_fee: u64) -> u64 {
        self.max_fee.min(base_fee.saturating_add(self.priority_fee))
    }

    /// Upper bound the sender must be able to cover: value plus worst-case
    /// gas charge.
    pub fn max_cost(&self) -> u64 {
        self.value
            .saturating_add(self.gas_limit.saturating_mul(self.max_fee))
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.put_len_prefixed(self.from.as_bytes());
        w.put_len_prefixed(self.to.as_bytes());
        w.put_u64(self.value);
        w.put_u64(self.nonce);
        w.put_u64(self.gas_limit);
        w.put_u64(self.max_fee);
        w.put_u64(self.priority_fee);
        w.put_len_prefixed(&self.data);
        w.put_bytes(&self.sender_pubkey);
    }

    /// Wire encoding per the transaction format.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(192 + self.data.len());
        self.encode_unsigned(&mut w);
        w.put_bytes(&self.signature);
        w.into_bytes()
    }

    /// Decode a transaction from its wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);

        let from = read_address(&mut r)?;
        let to = read_address(&mut r)?;
        let value = r.get_u64()?;
        let nonce = r.get_u64()?;
        let gas_limit = r.get_u64()?;
        let max_fee = r.get_u64()?;
        let priority_fee = r.get_u64()?;
        let data = r.get_len_prefixed()?.to_vec();
        let sender_pubkey = r.get_array::<PUBLIC_KEY_LEN>()?;
        let signature = r.get_array::<SIGNATURE_LEN>()?;

        Ok(Self {
            from,
            to,
            value,
            nonce,
            data,
            gas_limit,
            max_fee,
            priority_fee,
            sender_pubkey,
            signature,
        })
    }
}

fn read_address(r: &mut Reader<'_>) -> Result<Address, CodecError> {
    let bytes = r.get_len_prefixed()?;
    if bytes.len() != ADDRESS_LEN {
        return Err(CodecError::InvalidSize {
            expected: ADDRESS_LEN,
            got: bytes.len(),
        });
    }
    let mut payload = [0u8; ADDRESS_LEN];
    payload.copy_from_slice(bytes);
    // The wire carries only the payload; the kind tag is recovered from
    // context (state keys ignore it).
    Ok(Address::new(AddressKind::PaymentOnly, payload))
}

mod serde_bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod serde_sig_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_tx() -> Transaction {
        Transaction {
            from: Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            to: Address::new(AddressKind::PaymentOnly, [2u8; ADDRESS_LEN]),
            value: 2_500_000_000_000_000_000,
            nonce: 0,
            data: vec![0xca, 0xfe, 0x00, 0x01],
            gas_limit: 21_000,
            max_fee: 2_000_000_000,
            priority_fee: 1_000_000_000,
            sender_pubkey: [9u8; PUBLIC_KEY_LEN],
            signature: [3u8; SIGNATURE_LEN],
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let tx = sample_tx();
        let decoded = Transaction::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn hash_ignores_signature() {
        let tx = sample_tx();
        let mut resigned = tx.clone();
        resigned.signature = [0xffu8; SIGNATURE_LEN];
        assert_eq!(tx.hash(), resigned.hash());

        let mut different = tx.clone();
        different.nonce = 1;
        assert_ne!(tx.hash(), different.hash());
    }

    #[test]
    fn effective_price_is_capped_by_max_fee() {
        let tx = sample_tx();
        // base 1 gwei + priority 1 gwei == max fee 2 gwei
        assert_eq!(tx.effective_gas_price(1_000_000_000), 2_000_000_000);
        // base 5 gwei: capped at max fee
        assert_eq!(tx.effective_gas_price(5_000_000_000), 2_000_000_000);
        // base 0: base + priority
        assert_eq!(tx.effective_gas_price(0), 1_000_000_000);
    }

    #[test]
    fn creation_target_is_zero_address() {
        let mut tx = sample_tx();
        assert!(!tx.is_create());
        tx.to = Address::ZERO;
        assert!(tx.is_create());
    }

    #[test]
    fn decode_rejects_short_address() {
        let mut w = Writer::new();
        w.put_len_prefixed(&[0u8; 20]);
        let err = Transaction::decode(&w.into_bytes()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidSize { expected: 28, .. }));
    }
}
