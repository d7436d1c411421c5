//! Rotating sequencer set consensus.
//!
//! A stake-weighted round-robin assigns each slot to a leader; the active
//! set is the top-N eligible sequencers by stake. Block validation checks
//! parent linkage, the leader assignment and the sequencer's signature
//! over the header hash. Misbehavior evidence moves sequencers to the
//! slashed state immediately; stake penalties apply at epoch end.

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod slashing;

pub use config::ConsensusConfig;
pub use engine::{BlockProposal, ConsensusEngine};
pub use error::ConsensusError;
pub use registry::SequencerRegistry;
pub use slashing::{SlashingEvidence, SlashingKind};
