//! The node: owns every subsystem and drives the block lifecycle.

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis;
use parking_lot::{Mutex, RwLock};
use sable_consensus::{BlockProposal, ConsensusEngine};
use sable_crypto::KeyPair;
use sable_execution::{BlockContext, BlockProcessor, ProcessorConfig, TransactionProcessor};
use sable_mempool::{AddOutcome, Mempool, PoolStats};
use sable_settlement::{BatchBuilder, SettlementTracker, Submitter};
use sable_storage::{BlockStore, Database, StateStore};
use sable_types::{
    Address, Block, BlockHeader, Genesis, Hash, Receipt, SettlementRecord, SettlementStatus,
    Transaction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A running L2 node. Components are owned once, here; background tasks
/// borrow the node through an `Arc`.
pub struct Node {
    config: NodeConfig,
    /// Single writer during block processing, concurrent readers outside.
    state: RwLock<StateStore>,
    blocks: BlockStore,
    mempool: Mempool,
    consensus: ConsensusEngine,
    batch_builder: BatchBuilder,
    tracker: SettlementTracker,
    block_processor: BlockProcessor,
    sequencer_key: Option<KeyPair>,
    /// Post-state root of the last built batch, seeding the next batch's
    /// pre-state root.
    last_post_root: Mutex<Hash>,
    /// Unix-seconds timestamp of the last block this node observed.
    last_block_at: Mutex<u64>,
}

impl Node {
    /// Wire up a node over `db`, bootstrapping genesis when the chain is
    /// empty.
    pub fn new(
        config: NodeConfig,
        db: Arc<dyn Database>,
        genesis_config: Genesis,
        sequencer_key: Option<KeyPair>,
    ) -> Result<Self, NodeError> {
        let mut state = StateStore::open(db.clone())?;
        let blocks = BlockStore::open(db.clone())?;
        let head = genesis::bootstrap(&genesis_config, &mut state, &blocks)?;

        let consensus = ConsensusEngine::new(config.consensus.clone());
        consensus.set_head(head.number(), head.hash());

        let batch_builder = BatchBuilder::open(
            config.settlement.clone(),
            db,
            head.header.timestamp,
        )?;
        let tracker = SettlementTracker::new(config.settlement.clone());

        let processor = TransactionProcessor::new(ProcessorConfig {
            chain_id: config.chain_id,
            allow_dev_signatures: config.allow_dev_signatures,
        });
        let block_processor = BlockProcessor::new(processor);

        let last_post_root = Mutex::new(head.header.state_root);
        let last_block_at = Mutex::new(head.header.timestamp);
        let mempool = Mempool::new(config.mempool.clone());

        info!(
            chain_id = config.chain_id,
            head = head.number(),
            sequencer = sequencer_key.is_some(),
            "node initialized"
        );

        Ok(Self {
            config,
            state: RwLock::new(state),
            blocks,
            mempool,
            consensus,
            batch_builder,
            tracker,
            block_processor,
            sequencer_key,
            last_post_root,
            last_block_at,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn consensus(&self) -> &ConsensusEngine {
        &self.consensus
    }

    pub fn tracker(&self) -> &SettlementTracker {
        &self.tracker
    }

    pub fn batch_builder(&self) -> &BatchBuilder {
        &self.batch_builder
    }

    pub fn sequencer_address(&self) -> Option<Address> {
        self.sequencer_key.as_ref().map(|k| k.address())
    }

    // ---- submission and queries ----

    /// Admit a transaction to the pool. Success returns the transaction
    /// hash; rejection returns the categorized outcome.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash, AddOutcome> {
        if self
            .block_processor
            .transaction_processor()
            .verify_signature(&tx)
            .is_err()
        {
            return Err(AddOutcome::Invalid);
        }

        let (balance, nonce) = {
            let state = self.state.read();
            (state.get_balance(&tx.from), state.get_nonce(&tx.from))
        };

        let tx_hash = tx.hash();
        match self.mempool.add(tx, balance, nonce) {
            AddOutcome::Added | AddOutcome::Replaced => Ok(tx_hash),
            outcome => Err(outcome),
        }
    }

    pub fn get_receipt(&self, tx_hash: &Hash) -> Result<Option<Receipt>, NodeError> {
        Ok(self.blocks.get_receipt(tx_hash)?)
    }

    pub fn get_block(&self, number: u64) -> Result<Option<Block>, NodeError> {
        Ok(self.blocks.get_block(number)?)
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, NodeError> {
        Ok(self.blocks.get_block_by_hash(hash)?)
    }

    pub fn head_number(&self) -> Option<u64> {
        self.blocks.head()
    }

    pub fn balance(&self, addr: &Address) -> u64 {
        self.state.read().get_balance(addr)
    }

    pub fn nonce(&self, addr: &Address) -> u64 {
        self.state.read().get_nonce(addr)
    }

    pub fn state_root(&self) -> Hash {
        self.state.read().root()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.mempool.stats()
    }

    pub fn pending_transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.mempool.get(hash)
    }

    /// Batch status lookup: `None` for unknown ids.
    pub fn batch_status(&self, batch_id: u64) -> Option<SettlementStatus> {
        self.tracker.get_batch(batch_id).map(|r| r.status)
    }

    /// Read-only contract call at the current head.
    pub fn call_readonly(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
        gas_limit: u64,
    ) -> Result<(bool, Vec<u8>), NodeError> {
        let ctx = self.head_context()?;
        let mut state = self.state.write();
        Ok(self
            .block_processor
            .transaction_processor()
            .call_readonly(&mut state, from, to, data, gas_limit, &ctx))
    }

    /// Gas estimation by simulation.
    pub fn estimate_gas(&self, tx: &Transaction) -> Result<u64, NodeError> {
        let ctx = self.head_context()?;
        let mut state = self.state.write();
        Ok(self
            .block_processor
            .transaction_processor()
            .estimate_gas(&mut state, tx, &ctx)?)
    }

    fn head_context(&self) -> Result<BlockContext, NodeError> {
        let head = self
            .blocks
            .head_block()?
            .ok_or(NodeError::NotInitialized)?;
        Ok(BlockContext::from_header(&head.header, self.config.chain_id))
    }

    // ---- block production ----

    /// Produce a block for the current slot if this node is the scheduled
    /// leader, or the fallback producer once the leader's window has
    /// lapsed. Returns `Ok(None)` when it is simply not our turn.
    pub fn try_produce(&self, now_secs: u64) -> Result<Option<Block>, NodeError> {
        let Some(key) = &self.sequencer_key else {
            return Ok(None);
        };
        let our_addr = key.address();
        let (head_number, _) = self.consensus.head().ok_or(NodeError::NotInitialized)?;
        let slot = head_number + 1;

        if self.consensus.is_leader(slot, &our_addr) {
            return self.produce_block(now_secs, false).map(Some);
        }

        // Failover: the slot's leader has been silent for two block times.
        let block_time_secs = (self.config.consensus.block_time_ms / 1_000).max(1);
        let silent_for = now_secs.saturating_sub(*self.last_block_at.lock());
        let is_fallback = self
            .consensus
            .registry()
            .fallback_for_slot(slot)
            .map(|f| f.payload == our_addr.payload)
            .unwrap_or(false);
        if is_fallback && silent_for >= 2 * block_time_secs {
            debug!(slot, silent_for, "leader missed, producing as fallback");
            return self.produce_block(now_secs, true).map(Some);
        }

        Ok(None)
    }

    /// Build, execute, store and commit one block.
    pub fn produce_block(&self, now_secs: u64, failover: bool) -> Result<Block, NodeError> {
        let key = self.sequencer_key.as_ref().ok_or(NodeError::NoSequencerKey)?;
        let our_addr = key.address();
        let (head_number, head_hash) = self.consensus.head().ok_or(NodeError::NotInitialized)?;
        let slot = head_number + 1;

        let scheduled = self.consensus.is_leader(slot, &our_addr);
        let fallback = failover
            && self
                .consensus
                .registry()
                .fallback_for_slot(slot)
                .map(|f| f.payload == our_addr.payload)
                .unwrap_or(false);
        if !scheduled && !fallback {
            return Err(NodeError::NotOurSlot(slot));
        }

        let parent = self
            .blocks
            .get_block(head_number)?
            .ok_or(NodeError::NotInitialized)?;
        let base_fee = BlockProcessor::next_base_fee(&parent.header);
        let transactions = self.mempool.select(self.config.block_gas_limit, base_fee);

        let mut block = Block {
            header: BlockHeader {
                number: slot,
                parent_hash: head_hash,
                state_root: Hash::ZERO,
                tx_root: Hash::ZERO,
                receipts_root: Hash::ZERO,
                sequencer: our_addr,
                gas_limit: self.config.block_gas_limit,
                gas_used: 0,
                base_fee,
                timestamp: now_secs,
                l1_reference: 0,
                batch_id: self.batch_builder.next_batch_id(),
            },
            transactions,
        };
        block.header.tx_root = block.compute_tx_root();

        let outcome = {
            let mut state = self.state.write();
            self.block_processor.process_block(&mut state, &block)?
        };
        block.header.state_root = outcome.state_root;
        block.header.receipts_root = outcome.receipts_root;
        block.header.gas_used = outcome.total_gas_used;

        // Store block and receipts before the head moves so nothing is
        // ever queryable half-indexed.
        self.blocks.store_block(&block)?;
        for receipt in &outcome.receipts {
            self.blocks.store_receipt(receipt)?;
            self.blocks
                .index_transaction(&receipt.tx_hash, block.number(), receipt.index)?;
        }

        let signature = key.secret.sign(&block.header.hash().0).to_bytes();
        let proposal = BlockProposal::new(block.clone(), signature);
        if fallback && !scheduled {
            self.consensus.commit_failover_block(&proposal)?;
        } else {
            self.consensus.commit_block(&proposal)?;
        }

        let confirmed: Vec<Hash> = block.transactions.iter().map(|t| t.hash()).collect();
        self.mempool.remove_confirmed(&confirmed);
        self.batch_builder.add_block(block.clone());
        *self.last_block_at.lock() = now_secs;

        info!(
            number = block.number(),
            txs = block.transactions.len(),
            gas = block.header.gas_used,
            base_fee,
            "block produced"
        );
        Ok(block)
    }

    // ---- settlement ----

    /// One settlement iteration: roll a ready batch, submit pending
    /// records (including retries after submitter failures) and finalize
    /// records whose challenge window elapsed.
    pub async fn settle_tick(
        &self,
        now_secs: u64,
        submitter: &dyn Submitter,
    ) -> Result<(), NodeError> {
        if self.batch_builder.is_ready(now_secs) {
            let pre_state_root = *self.last_post_root.lock();
            let record = self.batch_builder.build_batch(pre_state_root, now_secs)?;
            *self.last_post_root.lock() = record.post_state_root;
            self.tracker.track(record);
        }

        let pending: Vec<SettlementRecord> = self
            .tracker
            .records()
            .into_iter()
            .filter(|r| r.status == SettlementStatus::Pending)
            .collect();
        for record in pending {
            if let Err(err) = self
                .tracker
                .submit_batch(record.batch_id, submitter, now_secs)
                .await
            {
                warn!(batch_id = record.batch_id, error = %err, "submission deferred");
            }
        }

        self.tracker.poll(now_secs);
        Ok(())
    }
}
