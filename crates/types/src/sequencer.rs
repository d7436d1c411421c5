//! Sequencer registry entries.

use crate::address::Address;
use crate::transaction::PUBLIC_KEY_LEN;
use serde::{Deserialize, Serialize};

/// Membership status of a sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerStatus {
    /// In the active set, producing blocks.
    Active,
    /// Eligible, waiting for rotation into the active set.
    Standby,
    /// Removed for misbehavior.
    Slashed,
    /// Voluntary exit; stake unbonding.
    Exiting,
}

/// A staked participant eligible to produce blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequencer {
    pub address: Address,
    pub public_key: [u8; PUBLIC_KEY_LEN],
    pub stake: u64,
    pub status: SequencerStatus,
    pub blocks_produced: u64,
    pub missed_slots: u64,
}

impl Sequencer {
    pub fn new(address: Address, public_key: [u8; PUBLIC_KEY_LEN], stake: u64) -> Self {
        Self {
            address,
            public_key,
            stake,
            status: SequencerStatus::Standby,
            blocks_produced: 0,
            missed_slots: 0,
        }
    }

    /// Eligible for the active set: enough stake, not slashed or exiting.
    pub fn is_eligible(&self, min_stake: u64) -> bool {
        self.stake >= min_stake
            && matches!(
                self.status,
                SequencerStatus::Active | SequencerStatus::Standby
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressKind, ADDRESS_LEN};

    fn seq(stake: u64, status: SequencerStatus) -> Sequencer {
        let mut s = Sequencer::new(
            Address::new(AddressKind::PaymentOnly, [1u8; ADDRESS_LEN]),
            [0u8; PUBLIC_KEY_LEN],
            stake,
        );
        s.status = status;
        s
    }

    #[test]
    fn eligibility_requires_min_stake() {
        assert!(seq(100, SequencerStatus::Standby).is_eligible(100));
        assert!(!seq(99, SequencerStatus::Standby).is_eligible(100));
    }

    #[test]
    fn slashed_and_exiting_are_ineligible() {
        assert!(!seq(1_000, SequencerStatus::Slashed).is_eligible(100));
        assert!(!seq(1_000, SequencerStatus::Exiting).is_eligible(100));
        assert!(seq(1_000, SequencerStatus::Active).is_eligible(100));
    }
}
