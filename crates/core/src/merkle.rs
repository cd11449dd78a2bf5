//! Merkle tree over transaction hashes.

use crate::hash::{hash_concat, Hash};

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    hash_concat(&[left.as_ref(), right.as_ref()])
}

/// Build the level above `level`. An odd trailing node is paired with itself.
fn parent_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|chunk| match chunk {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two elements"),
        })
        .collect()
}

/// Compute the merkle root of a list of hashes.
///
/// Returns the zero hash if the list is empty.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    MerkleTree::new(hashes).root()
}

/// A merkle tree kept level by level so every internal node can be re-verified.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// All nodes in the tree, level by level (leaves first).
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a merkle tree from a list of leaf hashes.
    pub fn new(leaves: &[Hash]) -> Self {
        let mut levels = vec![leaves.to_vec()];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = parent_level(current);
            levels.push(next);
        }
        Self { levels }
    }

    /// Get the root of the tree, or the zero hash for an empty tree.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash::ZERO)
    }

    /// Recompute every internal node from its children and check it matches.
    pub fn verify(&self) -> bool {
        self.levels
            .windows(2)
            .all(|pair| parent_level(&pair[0]) == pair[1])
            && self.levels.last().map(|top| top.len() <= 1).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash(&[i as u8])).collect()
    }

    #[test]
    fn test_merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = make_hashes(1);
        assert_eq!(merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = make_hashes(2);
        let expected = hash_concat(&[hashes[0].as_ref(), hashes[1].as_ref()]);
        assert_eq!(merkle_root(&hashes), expected);
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let hashes = make_hashes(3);
        let left = hash_pair(&hashes[0], &hashes[1]);
        let right = hash_pair(&hashes[2], &hashes[2]);
        assert_eq!(merkle_root(&hashes), hash_pair(&left, &right));
    }

    #[test]
    fn test_merkle_root_order_matters() {
        let hashes = make_hashes(4);
        let mut reversed = hashes.clone();
        reversed.reverse();
        assert_ne!(merkle_root(&hashes), merkle_root(&reversed));
    }

    #[test]
    fn test_merkle_tree_verifies() {
        for n in 0..9 {
            let tree = MerkleTree::new(&make_hashes(n));
            assert!(tree.verify(), "tree of {} leaves failed", n);
        }
    }

    #[test]
    fn test_merkle_tree_tampered_node_fails() {
        let mut tree = MerkleTree::new(&make_hashes(5));
        tree.levels[1][0] = hash(b"tampered");
        assert!(!tree.verify());
    }
}
