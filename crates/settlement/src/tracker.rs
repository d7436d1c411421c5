//! Settlement lifecycle tracking.
//!
//! ```text
//! Pending --submit--> Submitted --window elapsed--> Finalized
//!                        |
//!                        +--challenge--> Challenged --> Reverted | Finalized
//! ```
//!
//! A finalized record never changes. A reverted record truncates all
//! later records and flips their withdrawals to `Reverted`.

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use crate::withdrawal::{Withdrawal, WithdrawalStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use sable_types::{SettlementRecord, SettlementStatus};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// External L1 submission seam. The tracker never talks to the ledger
/// directly; a failed submission leaves the record `Pending` for retry.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit the record, returning an L1 confirmation handle.
    async fn submit(&self, record: &SettlementRecord) -> Result<String, SettlementError>;
}

/// Resolution of a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The challenger was right: the batch (and later history) reverts.
    Upheld,
    /// The challenge was dismissed: the batch finalizes.
    Dismissed,
}

struct TrackedBatch {
    record: SettlementRecord,
    submitted_at: Option<u64>,
    l1_reference: Option<String>,
}

struct TrackerInner {
    batches: BTreeMap<u64, TrackedBatch>,
    withdrawals: Vec<Withdrawal>,
}

/// Tracks settlement records from `Pending` to a terminal state.
pub struct SettlementTracker {
    config: SettlementConfig,
    inner: Mutex<TrackerInner>,
    finality_tx: broadcast::Sender<u64>,
}

impl SettlementTracker {
    pub fn new(config: SettlementConfig) -> Self {
        let (finality_tx, _) = broadcast::channel(64);
        Self {
            config,
            inner: Mutex::new(TrackerInner {
                batches: BTreeMap::new(),
                withdrawals: Vec::new(),
            }),
            finality_tx,
        }
    }

    /// Notified with a batch id each time a batch finalizes.
    pub fn subscribe_finality(&self) -> broadcast::Receiver<u64> {
        self.finality_tx.subscribe()
    }

    /// Start tracking a freshly built record.
    pub fn track(&self, record: SettlementRecord) {
        let mut inner = self.inner.lock();
        inner.batches.insert(
            record.batch_id,
            TrackedBatch {
                record,
                submitted_at: None,
                l1_reference: None,
            },
        );
    }

    /// Push a pending record through the submitter. On failure the record
    /// stays `Pending` so the next poll retries.
    pub async fn submit_batch(
        &self,
        batch_id: u64,
        submitter: &dyn Submitter,
        now_secs: u64,
    ) -> Result<(), SettlementError> {
        let record = {
            let inner = self.inner.lock();
            let tracked = inner
                .batches
                .get(&batch_id)
                .ok_or(SettlementError::BatchNotFound(batch_id))?;
            if tracked.record.status != SettlementStatus::Pending {
                return Err(SettlementError::InvalidTransition {
                    batch_id,
                    status: tracked.record.status.to_string(),
                    action: "submit",
                });
            }
            tracked.record.clone()
        };

        match submitter.submit(&record).await {
            Ok(l1_reference) => {
                let mut inner = self.inner.lock();
                if let Some(tracked) = inner.batches.get_mut(&batch_id) {
                    tracked.record.status = SettlementStatus::Submitted;
                    tracked.submitted_at = Some(now_secs);
                    tracked.l1_reference = Some(l1_reference.clone());
                }
                info!(batch_id, l1_reference, "batch submitted");
                Ok(())
            }
            Err(err) => {
                warn!(batch_id, error = %err, "batch submission failed, staying pending");
                Err(err)
            }
        }
    }

    /// A dispute arrived inside the challenge window.
    pub fn handle_challenge(&self, batch_id: u64) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock();
        let tracked = inner
            .batches
            .get_mut(&batch_id)
            .ok_or(SettlementError::BatchNotFound(batch_id))?;
        if tracked.record.status != SettlementStatus::Submitted {
            return Err(SettlementError::InvalidTransition {
                batch_id,
                status: tracked.record.status.to_string(),
                action: "challenge",
            });
        }
        warn!(batch_id, "batch challenged, lifecycle frozen");
        tracked.record.status = SettlementStatus::Challenged;
        Ok(())
    }

    /// Resolve a challenge. Upholding it reverts the batch and truncates
    /// every later record.
    pub fn resolve_challenge(
        &self,
        batch_id: u64,
        outcome: ChallengeOutcome,
    ) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock();
        {
            let tracked = inner
                .batches
                .get_mut(&batch_id)
                .ok_or(SettlementError::BatchNotFound(batch_id))?;
            if tracked.record.status != SettlementStatus::Challenged {
                return Err(SettlementError::InvalidTransition {
                    batch_id,
                    status: tracked.record.status.to_string(),
                    action: "resolve",
                });
            }

            match outcome {
                ChallengeOutcome::Dismissed => {
                    tracked.record.status = SettlementStatus::Finalized;
                    info!(batch_id, "challenge dismissed, batch finalized");
                }
                ChallengeOutcome::Upheld => {
                    tracked.record.status = SettlementStatus::Reverted;
                    warn!(batch_id, "challenge upheld, batch reverted");
                }
            }
        }

        match outcome {
            ChallengeOutcome::Dismissed => {
                Self::promote_withdrawals(&mut inner, batch_id);
                drop(inner);
                let _ = self.finality_tx.send(batch_id);
            }
            ChallengeOutcome::Upheld => {
                // Later history is built on a reverted state root.
                let later: Vec<u64> = inner
                    .batches
                    .range(batch_id + 1..)
                    .map(|(id, _)| *id)
                    .collect();
                for id in later {
                    if let Some(t) = inner.batches.get_mut(&id) {
                        t.record.status = SettlementStatus::Reverted;
                    }
                }
                for w in inner.withdrawals.iter_mut() {
                    if w.batch_id >= batch_id && w.status != WithdrawalStatus::Claimable {
                        w.status = WithdrawalStatus::Reverted;
                    }
                }
            }
        }
        Ok(())
    }

    /// Finalize every submitted batch whose challenge window elapsed.
    /// Returns the finalized batch ids.
    pub fn poll(&self, now_secs: u64) -> Vec<u64> {
        let mut finalized = Vec::new();
        {
            let mut inner = self.inner.lock();
            let window = self.config.challenge_window_secs;

            let due: Vec<u64> = inner
                .batches
                .iter()
                .filter(|(_, t)| {
                    t.record.status == SettlementStatus::Submitted
                        && t.submitted_at
                            .map(|at| now_secs.saturating_sub(at) >= window)
                            .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in due {
                if let Some(tracked) = inner.batches.get_mut(&id) {
                    tracked.record.status = SettlementStatus::Finalized;
                    info!(batch_id = id, "challenge window elapsed, batch finalized");
                }
                Self::promote_withdrawals(&mut inner, id);
                finalized.push(id);
            }
        }

        for id in &finalized {
            let _ = self.finality_tx.send(*id);
        }
        finalized
    }

    fn promote_withdrawals(inner: &mut TrackerInner, batch_id: u64) {
        for w in inner.withdrawals.iter_mut() {
            if w.batch_id == batch_id && w.status == WithdrawalStatus::Pending {
                w.status = WithdrawalStatus::Claimable;
            }
        }
    }

    pub fn queue_withdrawal(&self, withdrawal: Withdrawal) {
        self.inner.lock().withdrawals.push(withdrawal);
    }

    pub fn claimable_withdrawals(&self) -> Vec<Withdrawal> {
        self.inner
            .lock()
            .withdrawals
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Claimable)
            .cloned()
            .collect()
    }

    pub fn get_batch(&self, batch_id: u64) -> Option<SettlementRecord> {
        self.inner
            .lock()
            .batches
            .get(&batch_id)
            .map(|t| t.record.clone())
    }

    pub fn is_finalized(&self, batch_id: u64) -> bool {
        self.inner
            .lock()
            .batches
            .get(&batch_id)
            .map(|t| t.record.status == SettlementStatus::Finalized)
            .unwrap_or(false)
    }

    /// Highest tracked batch id, if any.
    pub fn current_batch_id(&self) -> Option<u64> {
        self.inner.lock().batches.keys().next_back().copied()
    }

    /// Highest L2 block covered by a finalized batch.
    pub fn finalized_block(&self) -> u64 {
        self.inner
            .lock()
            .batches
            .values()
            .filter(|t| t.record.status == SettlementStatus::Finalized)
            .map(|t| t.record.end_block)
            .max()
            .unwrap_or(0)
    }

    /// All records in batch-id order (test and inspection support).
    pub fn records(&self) -> Vec<SettlementRecord> {
        self.inner
            .lock()
            .batches
            .values()
            .map(|t| t.record.clone())
            .collect()
    }
}
