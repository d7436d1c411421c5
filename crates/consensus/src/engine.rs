//! Chain-head tracking, block validation and fork-choice anchors.

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::registry::SequencerRegistry;
use parking_lot::RwLock;
use sable_crypto::{PublicKey, Signature};
use sable_types::transaction::SIGNATURE_LEN;
use sable_types::{Address, Block, Hash};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A block together with its producer's signature over the header hash.
#[derive(Clone, Debug)]
pub struct BlockProposal {
    pub block: Block,
    pub signature: [u8; SIGNATURE_LEN],
}

impl BlockProposal {
    pub fn new(block: Block, signature: [u8; SIGNATURE_LEN]) -> Self {
        Self { block, signature }
    }
}

struct HeadState {
    number: u64,
    hash: Hash,
}

/// The consensus engine: validates proposals against the leader schedule
/// and parent linkage, tracks the canonical head and the ring of
/// L1-confirmed checkpoints used as fork-choice anchors.
pub struct ConsensusEngine {
    registry: SequencerRegistry,
    head: RwLock<Option<HeadState>>,
    /// `(block_number, header_hash)` pairs confirmed on L1, most recent
    /// last. Bounded by `checkpoint_capacity`.
    checkpoints: RwLock<VecDeque<(u64, Hash)>>,
    block_tx: broadcast::Sender<Block>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        let (block_tx, _) = broadcast::channel(256);
        Self {
            registry: SequencerRegistry::new(config),
            head: RwLock::new(None),
            checkpoints: RwLock::new(VecDeque::new()),
            block_tx,
        }
    }

    pub fn registry(&self) -> &SequencerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ConsensusConfig {
        self.registry.config()
    }

    /// Subscribe to accepted blocks.
    pub fn subscribe_blocks(&self) -> broadcast::Receiver<Block> {
        self.block_tx.subscribe()
    }

    /// Initialize the head from a stored block (genesis or restart).
    pub fn set_head(&self, number: u64, hash: Hash) {
        *self.head.write() = Some(HeadState { number, hash });
    }

    pub fn head(&self) -> Option<(u64, Hash)> {
        self.head.read().as_ref().map(|h| (h.number, h.hash))
    }

    pub fn current_epoch(&self) -> u64 {
        let head = self.head.read().as_ref().map(|h| h.number).unwrap_or(0);
        head / self.config().blocks_per_epoch
    }

    /// Whether `addr` is the scheduled leader for `slot`.
    pub fn is_leader(&self, slot: u64, addr: &Address) -> bool {
        self.registry
            .leader_for_slot(slot)
            .map(|leader| leader.payload == addr.payload)
            .unwrap_or(false)
    }

    /// Full proposal validation: linkage, leader, signature, roots, gas.
    pub fn validate_proposal(&self, proposal: &BlockProposal) -> Result<(), ConsensusError> {
        self.validate_proposal_inner(proposal, false)
    }

    /// Validation that also accepts the fallback producer, for slots
    /// whose scheduled leader has demonstrably missed its window.
    pub fn validate_failover_proposal(
        &self,
        proposal: &BlockProposal,
    ) -> Result<(), ConsensusError> {
        self.validate_proposal_inner(proposal, true)
    }

    fn validate_proposal_inner(
        &self,
        proposal: &BlockProposal,
        leader_missed: bool,
    ) -> Result<(), ConsensusError> {
        let header = &proposal.block.header;

        if let Some(head) = self.head.read().as_ref() {
            if header.number != head.number + 1 {
                return Err(ConsensusError::WrongNumber {
                    head: head.number,
                    got: header.number,
                });
            }
            if header.parent_hash != head.hash {
                return Err(ConsensusError::ParentMismatch {
                    expected: head.hash,
                    got: header.parent_hash,
                });
            }
        }

        // One slot per block number.
        let slot = header.number;
        let expected = self.registry.leader_for_slot(slot)?;
        let is_expected = expected.payload == header.sequencer.payload;
        let is_fallback = leader_missed
            && self
                .registry
                .fallback_for_slot(slot)
                .map(|f| f.payload == header.sequencer.payload)
                .unwrap_or(false);
        if !is_expected && !is_fallback {
            return Err(ConsensusError::WrongLeader {
                slot,
                expected,
                got: header.sequencer,
            });
        }
        if is_fallback && !is_expected {
            self.registry.record_missed(&expected, slot);
        }

        let sequencer = self
            .registry
            .get(&header.sequencer)
            .ok_or(ConsensusError::UnknownSequencer(header.sequencer))?;
        let header_hash = header.hash();
        let pubkey = PublicKey::from_bytes(&sequencer.public_key)
            .map_err(|_| ConsensusError::BadSignature(header_hash))?;
        let signature = Signature::from_bytes(&proposal.signature);
        pubkey
            .verify(&header_hash.0, &signature)
            .map_err(|_| ConsensusError::BadSignature(header_hash))?;

        if proposal.block.compute_tx_root() != header.tx_root {
            return Err(ConsensusError::TxRootMismatch);
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::GasCapExceeded {
                gas_used: header.gas_used,
                gas_limit: header.gas_limit,
            });
        }

        self.check_checkpoints(header.number, &header_hash)?;
        Ok(())
    }

    /// Accept a validated proposal: advance the head and notify
    /// subscribers.
    pub fn commit_block(&self, proposal: &BlockProposal) -> Result<(), ConsensusError> {
        self.commit_inner(proposal, false)
    }

    /// Accept a fallback producer's proposal after the scheduled leader
    /// missed its slot.
    pub fn commit_failover_block(&self, proposal: &BlockProposal) -> Result<(), ConsensusError> {
        self.commit_inner(proposal, true)
    }

    fn commit_inner(
        &self,
        proposal: &BlockProposal,
        leader_missed: bool,
    ) -> Result<(), ConsensusError> {
        self.validate_proposal_inner(proposal, leader_missed)?;

        let header_hash = proposal.block.hash();
        *self.head.write() = Some(HeadState {
            number: proposal.block.number(),
            hash: header_hash,
        });
        self.registry.record_produced(&proposal.block.header.sequencer);

        let epoch_len = self.config().blocks_per_epoch;
        if proposal.block.number() > 0 && proposal.block.number() % epoch_len == 0 {
            info!(epoch = proposal.block.number() / epoch_len, "epoch boundary");
            self.registry
                .on_epoch_end(proposal.block.header.timestamp);
        }

        debug!(number = proposal.block.number(), hash = %header_hash, "head advanced");
        let _ = self.block_tx.send(proposal.block.clone());
        Ok(())
    }

    /// Record an L1-confirmed checkpoint; the ring is bounded.
    pub fn set_l1_checkpoint(&self, block_number: u64, header_hash: Hash) {
        let mut checkpoints = self.checkpoints.write();
        checkpoints.push_back((block_number, header_hash));
        let capacity = self.config().checkpoint_capacity;
        while checkpoints.len() > capacity {
            checkpoints.pop_front();
        }
    }

    pub fn checkpoints(&self) -> Vec<(u64, Hash)> {
        self.checkpoints.read().iter().copied().collect()
    }

    fn check_checkpoints(&self, number: u64, hash: &Hash) -> Result<(), ConsensusError> {
        let checkpoints = self.checkpoints.read();
        for (cp_number, cp_hash) in checkpoints.iter() {
            if *cp_number == number && cp_hash != hash {
                return Err(ConsensusError::CheckpointViolation(number));
            }
        }
        Ok(())
    }
}
