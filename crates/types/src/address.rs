//! Account identifiers.
//!
//! An address is a 28-byte payload plus a kind tag. Equality and ordering
//! are on the payload first, then the kind, so sorted iteration over the
//! account set is deterministic.

use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the address payload in bytes.
pub const ADDRESS_LEN: usize = 28;

/// Kind tag carried alongside the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressKind {
    /// Payment plus staking credential.
    Basic = 0x00,
    /// Payment credential only.
    PaymentOnly = 0x01,
    /// Contract account created by the VM.
    Script = 0x02,
    /// Reserved range (precompiles).
    Reserved = 0x03,
}

impl AddressKind {
    pub fn from_byte(b: u8) -> Self {
        match b & 0x03 {
            0x00 => Self::Basic,
            0x01 => Self::PaymentOnly,
            0x02 => Self::Script,
            _ => Self::Reserved,
        }
    }
}

/// A 28-byte account identifier with a kind tag.
///
/// The all-zero payload denotes the contract-creation target in
/// transactions and is never a real account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    pub payload: [u8; ADDRESS_LEN],
}

impl Address {
    /// The contract-creation target.
    pub const ZERO: Self = Self {
        kind: AddressKind::PaymentOnly,
        payload: [0u8; ADDRESS_LEN],
    };

    pub fn new(kind: AddressKind, payload: [u8; ADDRESS_LEN]) -> Self {
        Self { kind, payload }
    }

    /// Derive an address from a 32-byte public key: the digest of the key,
    /// truncated to the payload length.
    pub fn from_public_key_bytes(public_key: &[u8; 32]) -> Self {
        let digest = Hash::compute(public_key);
        let mut payload = [0u8; ADDRESS_LEN];
        payload.copy_from_slice(&digest.0[..ADDRESS_LEN]);
        Self {
            kind: AddressKind::PaymentOnly,
            payload,
        }
    }

    /// Build a contract address from a digest (truncated), tagged `Script`.
    pub fn script_from_digest(digest: &Hash) -> Self {
        let mut payload = [0u8; ADDRESS_LEN];
        payload.copy_from_slice(&digest.0[..ADDRESS_LEN]);
        Self {
            kind: AddressKind::Script,
            payload,
        }
    }

    /// The reserved precompile address with the given id in the last byte.
    pub fn precompile(id: u8) -> Self {
        let mut payload = [0u8; ADDRESS_LEN];
        payload[ADDRESS_LEN - 1] = id;
        Self {
            kind: AddressKind::Reserved,
            payload,
        }
    }

    /// True for the contract-creation target.
    pub fn is_zero(&self) -> bool {
        self.payload == [0u8; ADDRESS_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.payload
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.payload
            .cmp(&other.payload)
            .then(self.kind.cmp(&other.kind))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:?}, {}..)", self.kind, hex::encode(&self.payload[..6]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.payload))
    }
}
