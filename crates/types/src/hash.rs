//! 32-byte digest type.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte digest. The all-zero digest is reserved for "absent".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The reserved all-zero digest.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Digest of the concatenation of several byte slices.
    pub fn compute_all(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_deterministic() {
        assert_eq!(Hash::compute(b"abc"), Hash::compute(b"abc"));
        assert_ne!(Hash::compute(b"abc"), Hash::compute(b"abd"));
    }

    #[test]
    fn compute_all_matches_concatenation() {
        let joined = Hash::compute(b"hello world");
        let parts = Hash::compute_all(&[b"hello ", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn zero_is_reserved() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::compute(b"").is_zero());
    }

    #[test]
    fn display_is_full_hex() {
        let h = Hash::compute(b"x");
        assert_eq!(h.to_string().len(), 64);
    }
}
