use serde::{Deserialize, Serialize};
use tel_types::Hash;

use crate::hasher::digest;

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Errors from Merkle tree construction.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a Merkle tree over an empty hash range")]
    EmptyRange,
}

/// Binary Merkle tree over an ordered list of hashes.
///
/// Levels are built bottom-up. A level of odd length pairs its last hash
/// with itself. Each parent is `digest(left_hex ":" right_hex)`.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Level 0 = leaves, last level = `[root]`.
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree from ordered leaf hashes. A single leaf is its own root.
    pub fn from_leaves(leaves: Vec<Hash>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyRange);
        }

        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [last] => hash_pair(last, last),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The root hash of the tree.
    pub fn root(&self) -> Hash {
        self.levels[self.levels.len() - 1][0]
    }

    /// Original leaf hashes in order.
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels including the leaves and the root.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels[0].get(index)?;

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling, side) = if idx % 2 == 0 {
                // Odd level: the last node pairs with itself.
                (*level.get(idx + 1).unwrap_or(&level[idx]), Side::Right)
            } else {
                (level[idx - 1], Side::Left)
            };
            path.push((sibling, side));
            idx /= 2;
        }

        Some(MerkleProof {
            leaf,
            path,
            root: self.root(),
        })
    }
}

/// Root of the Merkle tree over `hashes`, in the given order.
pub fn build_merkle_root(hashes: &[Hash]) -> Result<Hash, MerkleError> {
    Ok(MerkleTree::from_leaves(hashes.to_vec())?.root())
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf: Hash,
    /// Path of (sibling_hash, sibling_side) pairs from leaf to root.
    pub path: Vec<(Hash, Side)>,
    /// Expected root hash.
    pub root: Hash,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (sibling, side) in &self.path {
            current = match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            };
        }
        current == self.root
    }
}

/// Parent of two nodes: the digest of `"<left_hex>:<right_hex>"`.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(129);
    buf.extend_from_slice(left.to_hex().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(right.to_hex().as_bytes());
    digest(&buf)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn leaf(seed: u8) -> Hash {
        digest(&[seed])
    }

    #[test]
    fn empty_range_is_rejected() {
        assert_eq!(build_merkle_root(&[]).unwrap_err(), MerkleError::EmptyRange);
        assert!(MerkleTree::from_leaves(vec![]).is_err());
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaf(1);
        assert_eq!(build_merkle_root(&[l]).unwrap(), l);
    }

    #[test]
    fn pair_uses_hex_colon_rule() {
        let (a, b) = (leaf(1), leaf(2));
        let expected = digest(format!("{}:{}", a.to_hex(), b.to_hex()).as_bytes());
        assert_eq!(build_merkle_root(&[a, b]).unwrap(), expected);
    }

    #[test]
    fn three_leaves_duplicate_the_last() {
        let (h1, h2, h3) = (leaf(1), leaf(2), leaf(3));
        let left = hash_pair(&h1, &h2);
        let right = hash_pair(&h3, &h3);
        let expected = hash_pair(&left, &right);

        let tree = MerkleTree::from_leaves(vec![h1, h2, h3]).unwrap();
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn order_matters() {
        let forward = build_merkle_root(&[leaf(1), leaf(2)]).unwrap();
        let backward = build_merkle_root(&[leaf(2), leaf(1)]).unwrap();
        assert_ne!(forward, backward);
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        let leaves: Vec<Hash> = (0..7).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();

        for (i, l) in leaves.iter().enumerate() {
            let proof = tree.proof(i).expect("proof should exist");
            assert_eq!(proof.leaf, *l);
            assert!(proof.verify(), "proof for leaf {i} should verify");
        }
    }

    #[test]
    fn proof_out_of_bounds_returns_none() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2)]).unwrap();
        assert!(tree.proof(5).is_none());
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let tree = MerkleTree::from_leaves((1..=4).map(leaf).collect()).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof.leaf = leaf(99);
        assert!(!proof.verify());
    }

    #[test]
    fn power_of_two_leaves() {
        let tree = MerkleTree::from_leaves((0..8).map(leaf).collect()).unwrap();
        for i in 0..8 {
            let proof = tree.proof(i).unwrap();
            assert!(proof.verify());
            assert_eq!(proof.path.len(), 3);
        }
    }

    #[test]
    fn proof_serde_roundtrip() {
        let tree = MerkleTree::from_leaves((1..=4).map(leaf).collect()).unwrap();
        let proof = tree.proof(2).unwrap();
        let json = serde_json::to_string(&proof).unwrap();
        let parsed: MerkleProof = serde_json::from_str(&json).unwrap();
        assert_eq!(proof, parsed);
        assert!(parsed.verify());
    }

    proptest! {
        #[test]
        fn root_is_reproducible(seeds in proptest::collection::vec(any::<u8>(), 1..40)) {
            let leaves: Vec<Hash> = seeds.iter().map(|s| leaf(*s)).collect();
            let first = build_merkle_root(&leaves).unwrap();
            let second = build_merkle_root(&leaves.clone()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn every_leaf_has_a_valid_proof(count in 1usize..33) {
            let leaves: Vec<Hash> = (0..count).map(|i| leaf(i as u8)).collect();
            let tree = MerkleTree::from_leaves(leaves).unwrap();
            for i in 0..count {
                prop_assert!(tree.proof(i).unwrap().verify());
            }
        }
    }
}
