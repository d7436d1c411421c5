//! Cryptographic primitives for the Sable L2 node.
//!
//! Ed25519 signing and verification for transactions and block proposals,
//! plus address derivation (digest of the public key truncated to the
//! 28-byte payload).

pub mod error;
pub mod keys;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey, SecretKey, Signature};
