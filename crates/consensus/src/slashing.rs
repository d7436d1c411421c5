//! Misbehavior evidence and penalties.

use sable_types::Address;
use serde::{Deserialize, Serialize};

/// Evidence categories. Each carries a fixed slash percentage of the
/// sequencer's bonded stake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashingKind {
    /// Two signed headers at the same block number.
    DoubleSign,
    /// A block proven invalid after the fact.
    InvalidBlock,
    /// Missed-slot count crossed the configured threshold.
    Unavailability,
    /// Batch data for a produced block was never published.
    DataWithholding,
}

impl SlashingKind {
    /// Stake percentage burned for this offence.
    pub fn slash_percent(&self) -> u64 {
        match self {
            Self::DoubleSign => 5,
            Self::InvalidBlock => 10,
            Self::Unavailability => 1,
            Self::DataWithholding => 2,
        }
    }
}

/// A reported offence, queued until the end of the epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingEvidence {
    pub kind: SlashingKind,
    pub sequencer: Address,
    pub block_number: u64,
    pub evidence: Vec<u8>,
}

impl SlashingEvidence {
    /// Stake amount to burn given the sequencer's current stake.
    pub fn slash_amount(&self, stake: u64) -> u64 {
        stake / 100 * self.kind.slash_percent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::AddressKind;

    #[test]
    fn slash_amounts_follow_percentages() {
        let evidence = SlashingEvidence {
            kind: SlashingKind::DoubleSign,
            sequencer: Address::new(AddressKind::PaymentOnly, [1u8; 28]),
            block_number: 10,
            evidence: vec![],
        };
        assert_eq!(evidence.slash_amount(1_000_000), 50_000);

        let unavailable = SlashingEvidence {
            kind: SlashingKind::Unavailability,
            ..evidence
        };
        assert_eq!(unavailable.slash_amount(1_000_000), 10_000);
    }
}
