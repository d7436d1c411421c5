//! Mempool configuration.

use serde::{Deserialize, Serialize};

/// Pool limits and replacement policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Maximum number of transactions held.
    pub max_transactions: usize,
    /// Largest tolerated gap between a queued nonce and the sender's
    /// on-chain nonce.
    pub max_nonce_gap: u64,
    /// Replace-by-fee bump requirement in percent (110 = +10%).
    pub replacement_bump_percent: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            max_nonce_gap: 16,
            replacement_bump_percent: 110,
        }
    }
}
