//! Rolls sealed blocks into settlement batches.

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use parking_lot::Mutex;
use sable_storage::keys::BATCH_SEQ_KEY;
use sable_storage::Database;
use sable_types::codec::Writer;
use sable_types::merkle::merkle_root;
use sable_types::{Block, Hash, SettlementRecord, SettlementStatus};
use std::sync::Arc;
use tracing::info;

struct BuilderInner {
    pending: Vec<Block>,
    batch_started_at: u64,
    next_batch_id: u64,
}

/// Accumulates blocks and builds [`SettlementRecord`]s.
///
/// Batch ids are monotonic across restarts: the next id is persisted to
/// the KV store before a built record is handed out.
pub struct BatchBuilder {
    config: SettlementConfig,
    db: Arc<dyn Database>,
    inner: Mutex<BuilderInner>,
}

impl BatchBuilder {
    /// Open the builder, recovering the persisted batch counter.
    pub fn open(
        config: SettlementConfig,
        db: Arc<dyn Database>,
        now_secs: u64,
    ) -> Result<Self, SettlementError> {
        let next_batch_id = match db.get(BATCH_SEQ_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                u64::from_be_bytes(bytes.try_into().expect("8 bytes"))
            }
            _ => 1,
        };

        Ok(Self {
            config,
            db,
            inner: Mutex::new(BuilderInner {
                pending: Vec::new(),
                batch_started_at: now_secs,
                next_batch_id,
            }),
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Buffer a sealed block for the next batch.
    pub fn add_block(&self, block: Block) {
        self.inner.lock().pending.push(block);
    }

    pub fn pending_blocks(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn pending_transactions(&self) -> usize {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|b| b.transactions.len())
            .sum()
    }

    /// The id the next built batch will carry.
    pub fn next_batch_id(&self) -> u64 {
        self.inner.lock().next_batch_id
    }

    /// A batch is ready when it hits the size cap, or it is old enough
    /// and not trivially small.
    pub fn is_ready(&self, now_secs: u64) -> bool {
        let inner = self.inner.lock();
        if inner.pending.is_empty() {
            return false;
        }
        let txs: usize = inner.pending.iter().map(|b| b.transactions.len()).sum();
        if txs >= self.config.max_batch_size {
            return true;
        }
        now_secs.saturating_sub(inner.batch_started_at) >= self.config.max_batch_age_secs
            && txs >= self.config.min_batch_size
    }

    /// Roll every buffered block into a `Pending` settlement record and
    /// clear the buffer. The batch counter is persisted before the record
    /// is returned.
    pub fn build_batch(
        &self,
        pre_state_root: Hash,
        now_secs: u64,
    ) -> Result<SettlementRecord, SettlementError> {
        let mut inner = self.inner.lock();
        if inner.pending.is_empty() {
            return Err(SettlementError::EmptyBatch);
        }

        let batch_id = inner.next_batch_id;
        self.db
            .put(BATCH_SEQ_KEY, &(batch_id + 1).to_be_bytes())?;
        inner.next_batch_id = batch_id + 1;

        let blocks = std::mem::take(&mut inner.pending);
        inner.batch_started_at = now_secs;

        let header_hashes: Vec<Hash> = blocks.iter().map(|b| b.hash()).collect();
        let tx_root = merkle_root(&header_hashes);

        let mut compressed = Writer::new();
        for block in &blocks {
            compressed.put_len_prefixed_u32(&block.encode());
        }

        let record = SettlementRecord {
            batch_id,
            start_block: blocks.first().expect("non-empty").number(),
            end_block: blocks.last().expect("non-empty").number(),
            pre_state_root,
            post_state_root: blocks.last().expect("non-empty").header.state_root,
            tx_root,
            compressed_blocks: compressed.into_bytes(),
            status: SettlementStatus::Pending,
        };

        info!(
            batch_id,
            start = record.start_block,
            end = record.end_block,
            "batch built"
        );
        Ok(record)
    }
}
