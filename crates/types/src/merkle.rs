//! Binary Merkle tree over an ordered leaf sequence.
//!
//! Levels with an odd node count duplicate the last node. The root of an
//! empty sequence is the zero digest.

use crate::hash::Hash;

fn combine(left: &Hash, right: &Hash) -> Hash {
    Hash::compute_all(&[&left.0, &right.0])
}

/// Root over an ordered sequence of leaf hashes.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    if leaves.len() == 1 {
        return leaves[0];
    }

    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(*level.last().expect("non-empty level"));
        }
        level = level
            .chunks(2)
            .map(|pair| combine(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Inclusion proof (sibling path) for the leaf at `index`.
///
/// Returns `None` when `index` is out of range.
pub fn merkle_proof(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }
    if leaves.len() == 1 {
        return Some(Vec::new());
    }

    let mut proof = Vec::new();
    let mut level: Vec<Hash> = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(*level.last().expect("non-empty level"));
        }
        let sibling = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        proof.push(level[sibling]);

        level = level
            .chunks(2)
            .map(|pair| combine(&pair[0], &pair[1]))
            .collect();
        idx /= 2;
    }

    Some(proof)
}

/// Verify that `leaf` at `index` belongs to the tree with the given `root`.
pub fn verify_merkle_proof(leaf: &Hash, proof: &[Hash], index: usize, root: &Hash) -> bool {
    let mut current = *leaf;
    let mut idx = index;

    for sibling in proof {
        current = if idx % 2 == 0 {
            combine(&current, sibling)
        } else {
            combine(sibling, &current)
        };
        idx /= 2;
    }

    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| Hash::compute(&[i as u8])).collect()
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), l[0]);
    }

    #[test]
    fn proofs_verify_for_every_index() {
        for n in [2usize, 3, 4, 5, 7, 8, 13] {
            let l = leaves(n);
            let root = merkle_root(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = merkle_proof(&l, i).unwrap();
                assert!(
                    verify_merkle_proof(leaf, &proof, i, &root),
                    "n={n} i={i} should verify"
                );
            }
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let l = leaves(6);
        let root = merkle_root(&l);
        let proof = merkle_proof(&l, 2).unwrap();
        let forged = Hash::compute(b"forged");
        assert!(!verify_merkle_proof(&forged, &proof, 2, &root));
    }

    #[test]
    fn proof_for_out_of_range_index_is_none() {
        assert!(merkle_proof(&leaves(3), 3).is_none());
    }

    #[test]
    fn odd_levels_duplicate_last() {
        // With 3 leaves the last is paired with itself; the root must be
        // stable and distinct from the 2-leaf root.
        let l3 = leaves(3);
        let l2 = leaves(2);
        assert_ne!(merkle_root(&l3), merkle_root(&l2));
        assert_eq!(merkle_root(&l3), merkle_root(&l3));
    }
}
