//! Node configuration.

use sable_consensus::ConsensusConfig;
use sable_mempool::MempoolConfig;
use sable_settlement::SettlementConfig;
use serde::{Deserialize, Serialize};

/// Top-level node configuration, composed from the per-subsystem configs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain_id: u64,
    /// Gas limit applied to produced blocks.
    pub block_gas_limit: u64,
    /// Accept the all-0xFF placeholder signature. Test networks only.
    pub allow_dev_signatures: bool,
    pub consensus: ConsensusConfig,
    pub mempool: MempoolConfig,
    pub settlement: SettlementConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_gas_limit: 30_000_000,
            allow_dev_signatures: false,
            consensus: ConsensusConfig::default(),
            mempool: MempoolConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}
