//! The transaction pool.

use crate::config::MempoolConfig;
use crate::queue::Candidate;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sable_types::address::ADDRESS_LEN;
use sable_types::{Address, Hash, Transaction};
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::{debug, trace};

type SenderKey = [u8; ADDRESS_LEN];

/// Outcome of [`Mempool::add`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Accepted as a new entry.
    Added,
    /// Accepted, evicting a lower-fee transaction at the same nonce.
    Replaced,
    /// Same hash already pooled.
    AlreadyKnown,
    /// Replacement bump below the required percentage.
    Underpriced,
    /// Nonce below the sender's on-chain nonce.
    NonceTooLow,
    /// Nonce too far ahead of the sender's on-chain nonce.
    NonceTooHigh,
    /// Sender balance cannot cover value plus worst-case gas.
    InsufficientFunds,
    /// Pool at capacity.
    PoolFull,
    /// Structurally unusable transaction.
    Invalid,
}

/// Aggregate pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Immediately selectable (contiguous from the on-chain nonce).
    pub pending: usize,
    /// Parked behind a nonce gap.
    pub queued: usize,
    pub min_max_fee: u64,
    pub max_max_fee: u64,
}

struct PooledTx {
    tx: Transaction,
    arrival: DateTime<Utc>,
}

#[derive(Default)]
struct SenderQueue {
    /// nonce -> pooled hash
    by_nonce: BTreeMap<u64, Hash>,
    /// Latest observed on-chain nonce for this sender.
    on_chain_nonce: u64,
}

#[derive(Default)]
struct PoolInner {
    by_hash: HashMap<Hash, PooledTx>,
    by_sender: HashMap<SenderKey, SenderQueue>,
}

/// Thread-safe transaction pool. One lock guards all structures; every
/// operation is short.
pub struct Mempool {
    config: MempoolConfig,
    inner: Mutex<PoolInner>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(MempoolConfig::default())
    }
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Admit a transaction given the sender's current on-chain balance and
    /// nonce. Never panics, never blocks on I/O.
    pub fn add(&self, tx: Transaction, sender_balance: u64, sender_nonce: u64) -> AddOutcome {
        if tx.from.is_zero() || tx.gas_limit == 0 {
            return AddOutcome::Invalid;
        }

        let tx_hash = tx.hash();
        let mut inner = self.inner.lock();

        if inner.by_hash.contains_key(&tx_hash) {
            return AddOutcome::AlreadyKnown;
        }
        if tx.max_cost() > sender_balance {
            return AddOutcome::InsufficientFunds;
        }
        if tx.nonce < sender_nonce {
            return AddOutcome::NonceTooLow;
        }
        if tx.nonce > sender_nonce.saturating_add(self.config.max_nonce_gap) {
            return AddOutcome::NonceTooHigh;
        }

        let sender_key = tx.from.payload;
        let existing = inner
            .by_sender
            .get(&sender_key)
            .and_then(|q| q.by_nonce.get(&tx.nonce))
            .copied();

        if let Some(old_hash) = existing {
            let old_max_fee = inner
                .by_hash
                .get(&old_hash)
                .map(|p| p.tx.max_fee)
                .unwrap_or(0);
            // Replacement needs max_fee >= bump% of the incumbent.
            let required = old_max_fee.saturating_mul(self.config.replacement_bump_percent);
            if tx.max_fee.saturating_mul(100) < required {
                return AddOutcome::Underpriced;
            }

            inner.by_hash.remove(&old_hash);
            let queue = inner.by_sender.entry(sender_key).or_default();
            queue.on_chain_nonce = sender_nonce;
            queue.by_nonce.insert(tx.nonce, tx_hash);
            inner.by_hash.insert(
                tx_hash,
                PooledTx {
                    tx,
                    arrival: Utc::now(),
                },
            );
            debug!(%tx_hash, "transaction replaced by fee");
            return AddOutcome::Replaced;
        }

        if inner.by_hash.len() >= self.config.max_transactions {
            return AddOutcome::PoolFull;
        }

        let queue = inner.by_sender.entry(sender_key).or_default();
        queue.on_chain_nonce = sender_nonce;
        queue.by_nonce.insert(tx.nonce, tx_hash);
        inner.by_hash.insert(
            tx_hash,
            PooledTx {
                tx,
                arrival: Utc::now(),
            },
        );
        trace!(%tx_hash, "transaction added");
        AddOutcome::Added
    }

    /// Select transactions for a block: per sender contiguous nonces from
    /// the on-chain nonce, total gas within `gas_limit`, effective price
    /// at `base_fee` at least `base_fee`, ordered by price then arrival.
    pub fn select(&self, gas_limit: u64, base_fee: u64) -> Vec<Transaction> {
        let inner = self.inner.lock();

        struct Head {
            candidate: Candidate,
            sender: SenderKey,
            nonce: u64,
        }
        impl PartialEq for Head {
            fn eq(&self, other: &Self) -> bool {
                self.candidate == other.candidate
            }
        }
        impl Eq for Head {}
        impl PartialOrd for Head {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Head {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.candidate.cmp(&other.candidate)
            }
        }

        let head_for = |sender: SenderKey, nonce: u64| -> Option<Head> {
            let queue = inner.by_sender.get(&sender)?;
            let hash = queue.by_nonce.get(&nonce)?;
            let pooled = inner.by_hash.get(hash)?;
            let price = pooled.tx.effective_gas_price(base_fee);
            if price < base_fee {
                return None;
            }
            Some(Head {
                candidate: Candidate {
                    tx_hash: *hash,
                    effective_price: price,
                    arrival: pooled.arrival,
                },
                sender,
                nonce,
            })
        };

        let mut heap: BinaryHeap<Head> = inner
            .by_sender
            .iter()
            .filter_map(|(sender, queue)| head_for(*sender, queue.on_chain_nonce))
            .collect();

        let mut selected = Vec::new();
        let mut gas_total = 0u64;

        while let Some(head) = heap.pop() {
            let pooled = match inner.by_hash.get(&head.candidate.tx_hash) {
                Some(p) => p,
                None => continue,
            };
            if gas_total.saturating_add(pooled.tx.gas_limit) > gas_limit {
                // This sender's chain stops here; contiguity forbids
                // skipping ahead to a later nonce.
                continue;
            }
            gas_total += pooled.tx.gas_limit;
            selected.push(pooled.tx.clone());

            if let Some(next) = head_for(head.sender, head.nonce + 1) {
                heap.push(next);
            }
        }

        selected
    }

    /// Drop transactions that were included in a block and advance the
    /// senders' observed on-chain nonces past them.
    pub fn remove_confirmed(&self, hashes: &[Hash]) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;

        for hash in hashes {
            if let Some(pooled) = inner.by_hash.remove(hash) {
                removed += 1;
                let sender_key = pooled.tx.from.payload;
                let now_empty = match inner.by_sender.get_mut(&sender_key) {
                    Some(queue) => {
                        queue.by_nonce.remove(&pooled.tx.nonce);
                        queue.on_chain_nonce = queue.on_chain_nonce.max(pooled.tx.nonce + 1);
                        queue.by_nonce.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    inner.by_sender.remove(&sender_key);
                }
            }
        }

        if removed > 0 {
            debug!(removed, "confirmed transactions dropped from pool");
        }
        removed
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.inner.lock().by_hash.get(hash).map(|p| p.tx.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    /// All pooled transactions from `sender`, in nonce order.
    pub fn pending_for(&self, sender: &Address) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let Some(queue) = inner.by_sender.get(&sender.payload) else {
            return Vec::new();
        };
        queue
            .by_nonce
            .values()
            .filter_map(|hash| inner.by_hash.get(hash).map(|p| p.tx.clone()))
            .collect()
    }

    /// Next nonce `sender` should use: the end of the contiguous run of
    /// pooled nonces starting at the on-chain nonce.
    pub fn pending_nonce(&self, sender: &Address) -> Option<u64> {
        let inner = self.inner.lock();
        let queue = inner.by_sender.get(&sender.payload)?;
        let mut next = queue.on_chain_nonce;
        while queue.by_nonce.contains_key(&next) {
            next += 1;
        }
        Some(next)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_hash.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let mut stats = PoolStats {
            min_max_fee: u64::MAX,
            ..Default::default()
        };

        for queue in inner.by_sender.values() {
            let mut next = queue.on_chain_nonce;
            for (nonce, hash) in &queue.by_nonce {
                if *nonce == next {
                    stats.pending += 1;
                    next += 1;
                } else {
                    stats.queued += 1;
                }
                if let Some(pooled) = inner.by_hash.get(hash) {
                    stats.min_max_fee = stats.min_max_fee.min(pooled.tx.max_fee);
                    stats.max_max_fee = stats.max_max_fee.max(pooled.tx.max_fee);
                }
            }
        }

        if stats.min_max_fee == u64::MAX {
            stats.min_max_fee = 0;
        }
        stats
    }

    /// Clear everything (test support).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_hash.clear();
        inner.by_sender.clear();
    }
}
