//! The sequencer registry and leader schedule.

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::slashing::{SlashingEvidence, SlashingKind};
use parking_lot::RwLock;
use sable_types::address::ADDRESS_LEN;
use sable_types::{Address, Sequencer, SequencerStatus};
use std::collections::HashMap;
use tracing::{info, warn};

struct RegistryInner {
    /// All known sequencers, any status.
    sequencers: Vec<Sequencer>,
    /// Top-N eligible by stake, recomputed on every membership change.
    active: Vec<Sequencer>,
    /// Offences queued until the epoch boundary.
    pending_slashings: Vec<SlashingEvidence>,
    /// Wall-clock second at which each exiting sequencer requested exit.
    exiting_since: HashMap<[u8; ADDRESS_LEN], u64>,
}

/// Stake-weighted rotating sequencer set.
///
/// Reads happen on every leader lookup; writes only on register,
/// unregister, stake updates and slashing.
pub struct SequencerRegistry {
    config: ConsensusConfig,
    inner: RwLock<RegistryInner>,
}

impl SequencerRegistry {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(RegistryInner {
                sequencers: Vec::new(),
                active: Vec::new(),
                pending_slashings: Vec::new(),
                exiting_since: HashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Register a sequencer or update an existing registration.
    pub fn register(&self, sequencer: Sequencer) -> Result<(), ConsensusError> {
        if sequencer.stake < self.config.min_stake {
            return Err(ConsensusError::StakeTooLow {
                stake: sequencer.stake,
                min_stake: self.config.min_stake,
            });
        }

        let mut inner = self.inner.write();
        match inner
            .sequencers
            .iter_mut()
            .find(|s| s.address.payload == sequencer.address.payload)
        {
            Some(existing) => *existing = sequencer,
            None => {
                info!(address = %sequencer.address, stake = sequencer.stake, "sequencer registered");
                inner.sequencers.push(sequencer);
            }
        }
        Self::rebuild_active(&self.config, &mut inner);
        Ok(())
    }

    /// Begin a voluntary exit; the sequencer leaves the active set now and
    /// is removed after the unbonding period at an epoch boundary.
    pub fn request_exit(&self, addr: &Address, now_secs: u64) -> Result<(), ConsensusError> {
        let mut inner = self.inner.write();
        let seq = inner
            .sequencers
            .iter_mut()
            .find(|s| s.address.payload == addr.payload)
            .ok_or(ConsensusError::UnknownSequencer(*addr))?;
        seq.status = SequencerStatus::Exiting;
        inner.exiting_since.insert(addr.payload, now_secs);
        Self::rebuild_active(&self.config, &mut inner);
        Ok(())
    }

    pub fn update_stake(&self, addr: &Address, new_stake: u64) -> Result<(), ConsensusError> {
        let mut inner = self.inner.write();
        let seq = inner
            .sequencers
            .iter_mut()
            .find(|s| s.address.payload == addr.payload)
            .ok_or(ConsensusError::UnknownSequencer(*addr))?;
        seq.stake = new_stake;
        Self::rebuild_active(&self.config, &mut inner);
        Ok(())
    }

    /// Record an offence: the sequencer is removed from the active set
    /// immediately; the stake penalty applies at epoch end.
    pub fn report_misbehavior(&self, evidence: SlashingEvidence) {
        let mut inner = self.inner.write();
        warn!(
            sequencer = %evidence.sequencer,
            kind = ?evidence.kind,
            block = evidence.block_number,
            "misbehavior reported"
        );
        if let Some(seq) = inner
            .sequencers
            .iter_mut()
            .find(|s| s.address.payload == evidence.sequencer.payload)
        {
            seq.status = SequencerStatus::Slashed;
        }
        inner.pending_slashings.push(evidence);
        Self::rebuild_active(&self.config, &mut inner);
    }

    pub fn pending_slashings(&self) -> Vec<SlashingEvidence> {
        self.inner.read().pending_slashings.clone()
    }

    /// Leader for `slot`: interpret the slot modulo total active stake and
    /// walk the set in descending-stake order, accumulating stake until
    /// the running total exceeds it. Slot share is proportional to stake.
    pub fn leader_for_slot(&self, slot: u64) -> Result<Address, ConsensusError> {
        let inner = self.inner.read();
        if inner.active.is_empty() {
            return Err(ConsensusError::EmptyActiveSet);
        }

        let total: u64 = inner.active.iter().map(|s| s.stake).sum::<u64>().max(1);
        let slot_stake = slot % total;

        let mut cumulative = 0u64;
        for seq in &inner.active {
            cumulative += seq.stake;
            if slot_stake < cumulative {
                return Ok(seq.address);
            }
        }
        Ok(inner.active[0].address)
    }

    /// Fallback producer for `slot`: the next sequencer after the
    /// scheduled leader in descending-stake order, used once the leader
    /// has missed its window.
    pub fn fallback_for_slot(&self, slot: u64) -> Result<Address, ConsensusError> {
        let leader = self.leader_for_slot(slot)?;
        let inner = self.inner.read();
        let idx = inner
            .active
            .iter()
            .position(|s| s.address.payload == leader.payload)
            .unwrap_or(0);
        let next = (idx + 1) % inner.active.len();
        Ok(inner.active[next].address)
    }

    /// The next slot after `current_slot` assigned to `addr`.
    ///
    /// The schedule gives each sequencer the residues
    /// `[start, start + stake)` of `slot % total_stake`, where `start` is
    /// the cumulative stake ahead of it in descending-stake order. The
    /// next slot is computed from that range directly; `None` when `addr`
    /// is not in the active set.
    pub fn next_slot_for(&self, addr: &Address, current_slot: u64) -> Option<u64> {
        let inner = self.inner.read();
        if inner.active.is_empty() {
            return None;
        }
        let total: u64 = inner.active.iter().map(|s| s.stake).sum::<u64>().max(1);

        let mut start = 0u64;
        let mut span = None;
        for seq in &inner.active {
            if seq.address.payload == addr.payload {
                span = Some(seq.stake);
                break;
            }
            start += seq.stake;
        }
        let span = span.filter(|stake| *stake > 0)?;

        let from = current_slot + 1;
        let residue = from % total;
        let delta = if residue < start {
            start - residue
        } else if residue < start + span {
            0
        } else {
            total - residue + start
        };
        Some(from + delta)
    }

    pub fn active_sequencers(&self) -> Vec<Sequencer> {
        self.inner.read().active.clone()
    }

    pub fn total_active_stake(&self) -> u64 {
        self.inner.read().active.iter().map(|s| s.stake).sum()
    }

    pub fn get(&self, addr: &Address) -> Option<Sequencer> {
        self.inner
            .read()
            .sequencers
            .iter()
            .find(|s| s.address.payload == addr.payload)
            .cloned()
    }

    /// Bump production counters for a sealed block.
    pub fn record_produced(&self, addr: &Address) {
        let mut inner = self.inner.write();
        if let Some(seq) = inner
            .sequencers
            .iter_mut()
            .find(|s| s.address.payload == addr.payload)
        {
            seq.blocks_produced += 1;
        }
    }

    /// Bump the missed-slot counter; crossing the threshold raises
    /// unavailability evidence automatically.
    pub fn record_missed(&self, addr: &Address, slot: u64) -> Option<SlashingEvidence> {
        let crossed = {
            let mut inner = self.inner.write();
            let seq = inner
                .sequencers
                .iter_mut()
                .find(|s| s.address.payload == addr.payload)?;
            seq.missed_slots += 1;
            seq.missed_slots == self.config.max_missed_slots
        };

        if crossed {
            let evidence = SlashingEvidence {
                kind: SlashingKind::Unavailability,
                sequencer: *addr,
                block_number: slot,
                evidence: Vec::new(),
            };
            self.report_misbehavior(evidence.clone());
            Some(evidence)
        } else {
            None
        }
    }

    /// Epoch boundary: burn queued slashing penalties, drop exiting
    /// sequencers past the unbonding period, recompute the active set.
    pub fn on_epoch_end(&self, now_secs: u64) {
        let mut inner = self.inner.write();

        let slashings = std::mem::take(&mut inner.pending_slashings);
        for evidence in slashings {
            if let Some(seq) = inner
                .sequencers
                .iter_mut()
                .find(|s| s.address.payload == evidence.sequencer.payload)
            {
                let amount = evidence.slash_amount(seq.stake);
                seq.stake = seq.stake.saturating_sub(amount);
                info!(
                    sequencer = %seq.address,
                    kind = ?evidence.kind,
                    burned = amount,
                    remaining = seq.stake,
                    "slash applied"
                );
            }
        }

        let unbonding = self.config.unbonding_period_secs;
        let exiting_since = std::mem::take(&mut inner.exiting_since);
        let mut still_exiting = HashMap::new();
        inner.sequencers.retain(|s| {
            if s.status != SequencerStatus::Exiting {
                return true;
            }
            match exiting_since.get(&s.address.payload) {
                Some(since) if now_secs.saturating_sub(*since) >= unbonding => {
                    info!(sequencer = %s.address, "exit complete, sequencer removed");
                    false
                }
                Some(since) => {
                    still_exiting.insert(s.address.payload, *since);
                    true
                }
                None => true,
            }
        });
        inner.exiting_since = still_exiting;

        Self::rebuild_active(&self.config, &mut inner);
    }

    fn rebuild_active(config: &ConsensusConfig, inner: &mut RegistryInner) {
        let mut eligible: Vec<Sequencer> = inner
            .sequencers
            .iter()
            .filter(|s| s.is_eligible(config.min_stake))
            .cloned()
            .collect();

        // Stake descending, address bytewise ascending on ties.
        eligible.sort_by(|a, b| {
            b.stake
                .cmp(&a.stake)
                .then_with(|| a.address.payload.cmp(&b.address.payload))
        });
        eligible.truncate(config.max_sequencers as usize);

        for seq in &mut eligible {
            seq.status = SequencerStatus::Active;
        }
        // Mirror the Active status back into the registry.
        for seq in inner.sequencers.iter_mut() {
            if matches!(
                seq.status,
                SequencerStatus::Active | SequencerStatus::Standby
            ) {
                let in_active = eligible
                    .iter()
                    .any(|a| a.address.payload == seq.address.payload);
                seq.status = if in_active {
                    SequencerStatus::Active
                } else {
                    SequencerStatus::Standby
                };
            }
        }
        inner.active = eligible;
    }
}
