//! Crypto error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Bytes did not form a valid public key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Bytes did not form a valid signature.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// Signature did not verify against the message and key.
    #[error("signature verification failed")]
    VerificationFailed,
}
