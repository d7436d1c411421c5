//! Price-ordered candidate queue used during block building.

use chrono::{DateTime, Utc};
use sable_types::Hash;
use std::cmp::Ordering;

/// A selectable candidate: highest effective price first, older arrival
/// first on ties, hash as the final deterministic tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub tx_hash: Hash,
    pub effective_price: u64,
    pub arrival: DateTime<Utc>,
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.effective_price
            .cmp(&other.effective_price)
            .then_with(|| other.arrival.cmp(&self.arrival))
            .then_with(|| other.tx_hash.0.cmp(&self.tx_hash.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn candidate(price: u64, arrival_ms: i64, tag: u8) -> Candidate {
        Candidate {
            tx_hash: Hash::compute(&[tag]),
            effective_price: price,
            arrival: DateTime::<Utc>::from_timestamp_millis(arrival_ms).unwrap(),
        }
    }

    #[test]
    fn higher_price_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(candidate(10, 0, 1));
        heap.push(candidate(30, 0, 2));
        heap.push(candidate(20, 0, 3));

        assert_eq!(heap.pop().unwrap().effective_price, 30);
        assert_eq!(heap.pop().unwrap().effective_price, 20);
        assert_eq!(heap.pop().unwrap().effective_price, 10);
    }

    #[test]
    fn earlier_arrival_wins_ties() {
        let mut heap = BinaryHeap::new();
        heap.push(candidate(10, 200, 1));
        heap.push(candidate(10, 100, 2));

        let first = heap.pop().unwrap();
        assert_eq!(first.tx_hash, Hash::compute(&[2]));
    }
}
