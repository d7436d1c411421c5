//! Ed25519 key material.
//!
//! Wraps `ed25519-consensus` so the rest of the node never touches raw
//! curve types. Addresses derive from the public key as
//! `hash(pubkey)[..28]`.

use crate::error::CryptoError;
use ed25519_consensus::{Signature as RawSignature, SigningKey, VerificationKey};
use rand::{CryptoRng, RngCore};
use sable_types::transaction::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
use sable_types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ed25519 secret key (32-byte seed).
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Generate a fresh key from a cryptographic RNG.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic key from a 32-byte seed. Used heavily by tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(SigningKey::from(seed))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verification_key())
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey").field("seed", &"[redacted]").finish()
    }
}

/// Ed25519 public key (32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(VerificationKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<Self, CryptoError> {
        VerificationKey::try_from(*bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        self.0
            .verify(&sig.0, msg)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    /// Address payload: digest of the key, truncated to 28 bytes.
    pub fn derive_address(&self) -> Address {
        Address::from_public_key_bytes(&self.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.to_bytes()[..6]))
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(RawSignature);

impl Signature {
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Self {
        Self(RawSignature::from(*bytes))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.to_bytes()[..6]))
    }
}

/// Convenience bundle of a secret key with its derived public half.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let secret = SecretKey::generate(rng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = SecretKey::from_seed(seed);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn address(&self) -> Address {
        self.public.derive_address()
    }
}

/// Serializable key information (public half only).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    pub public_key: String,
    pub address: String,
}

impl From<&PublicKey> for PublicKeyInfo {
    fn from(pk: &PublicKey) -> Self {
        Self {
            public_key: hex::encode(pk.to_bytes()),
            address: pk.derive_address().to_string(),
        }
    }
}
