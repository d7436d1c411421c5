//! Consensus configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the rotating sequencer set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// One slot per this many milliseconds.
    pub block_time_ms: u64,
    /// Slots per epoch; slashings and exits settle at epoch boundaries.
    pub blocks_per_epoch: u64,
    /// Active set size cap.
    pub max_sequencers: u32,
    /// Minimum bonded stake to be eligible.
    pub min_stake: u64,
    /// Seconds an exiting sequencer stays bonded.
    pub unbonding_period_secs: u64,
    /// Missed slots tolerated before unavailability evidence is raised.
    pub max_missed_slots: u64,
    /// Bounded ring of L1-confirmed checkpoint roots.
    pub checkpoint_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time_ms: 1_000,
            blocks_per_epoch: 86_400,
            max_sequencers: 21,
            min_stake: 100_000,
            unbonding_period_secs: 604_800,
            max_missed_slots: 1_000,
            checkpoint_capacity: 128,
        }
    }
}
