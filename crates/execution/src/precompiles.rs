//! Precompiled contracts.
//!
//! Precompiles live at reserved addresses whose payload is all zero except
//! the last byte (the precompile id). They run with fixed gas functions and
//! never re-enter the interpreter.
//!
//! Registry:
//! - id `0x02`: SHA-256 of the input
//! - id `0x04`: identity (returns the input)

use crate::error::VmError;
use sable_types::Address;
use sha2::{Digest, Sha256};

pub const SHA256_ID: u8 = 0x02;
pub const IDENTITY_ID: u8 = 0x04;

const SHA256_BASE: u64 = 60;
const SHA256_WORD: u64 = 12;
const IDENTITY_BASE: u64 = 15;
const IDENTITY_WORD: u64 = 3;

/// Output and gas consumed by a precompile run.
#[derive(Debug)]
pub struct PrecompileOutput {
    pub gas_used: u64,
    pub data: Vec<u8>,
}

/// Returns the precompile id when `addr` is a reserved precompile address.
pub fn lookup(addr: &Address) -> Option<u8> {
    let payload = addr.as_bytes();
    let id = payload[payload.len() - 1];
    let rest_zero = payload[..payload.len() - 1].iter().all(|b| *b == 0);
    if rest_zero && matches!(id, SHA256_ID | IDENTITY_ID) {
        Some(id)
    } else {
        None
    }
}

/// Run precompile `id` over `input` within `gas_limit`.
pub fn execute(id: u8, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, VmError> {
    let words = (input.len() as u64).div_ceil(32);
    let (cost, data) = match id {
        SHA256_ID => {
            let cost = SHA256_BASE + SHA256_WORD * words;
            let mut hasher = Sha256::new();
            hasher.update(input);
            (cost, hasher.finalize().to_vec())
        }
        IDENTITY_ID => (IDENTITY_BASE + IDENTITY_WORD * words, input.to_vec()),
        other => return Err(VmError::InvalidOpcode(other)),
    };

    if cost > gas_limit {
        return Err(VmError::OutOfGas);
    }
    Ok(PrecompileOutput {
        gas_used: cost,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::Hash;

    #[test]
    fn lookup_recognizes_reserved_addresses() {
        assert_eq!(lookup(&Address::precompile(SHA256_ID)), Some(SHA256_ID));
        assert_eq!(lookup(&Address::precompile(IDENTITY_ID)), Some(IDENTITY_ID));
        assert_eq!(lookup(&Address::precompile(0x07)), None);
        assert_eq!(lookup(&Address::ZERO), None);
    }

    #[test]
    fn identity_echoes_input() {
        let out = execute(IDENTITY_ID, b"hello", 1_000).unwrap();
        assert_eq!(out.data, b"hello");
        assert_eq!(out.gas_used, 15 + 3);
    }

    #[test]
    fn sha256_matches_hash_primitive() {
        let out = execute(SHA256_ID, b"data", 1_000).unwrap();
        assert_eq!(out.data, Hash::compute(b"data").0.to_vec());
    }

    #[test]
    fn insufficient_gas_is_out_of_gas() {
        assert_eq!(
            execute(SHA256_ID, b"data", 10).unwrap_err(),
            VmError::OutOfGas
        );
    }
}
