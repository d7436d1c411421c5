//! Settlement configuration.

use serde::{Deserialize, Serialize};

/// Batch maturity and challenge-window policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Transaction count that makes a batch ready regardless of age.
    pub max_batch_size: usize,
    /// Age in seconds after which a batch is ready once it holds at least
    /// `min_batch_size` transactions.
    pub max_batch_age_secs: u64,
    /// Never submit batches smaller than this on age alone.
    pub min_batch_size: usize,
    /// Seconds a submitted batch can be disputed before it finalizes.
    pub challenge_window_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50_000,
            max_batch_age_secs: 3_600,
            min_batch_size: 100,
            challenge_window_secs: 604_800,
        }
    }
}
