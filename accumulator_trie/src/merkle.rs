//! A sparse, fixed-depth binary Merkle tree over [`Digest`]s.
//!
//! Only non-empty nodes are stored. Any node that is absent from its level
//! equals the digest of an empty subtree of that height, where
//! `empty[0] = 0x00..00` and `empty[l + 1] = compress(empty[l], empty[l])`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::{Config, Digest};

/// Deepest tree whose positions all fit in a non-negative `i64`.
pub const MAX_DEPTH: usize = 63;

/// Stores the result of Merkle tree operations.
pub type MerkleResult<T> = Result<T, MerkleError>;

/// An error type for Merkle tree operations and proof checks.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MerkleError {
    /// The position does not address a leaf of the tree.
    #[error("leaf position {position} is outside of a tree of depth {depth}")]
    PositionOutOfRange {
        /// Offending position.
        position: i64,
        /// Depth of the tree.
        depth: usize,
    },

    /// The proof does not carry one sibling per level.
    #[error("proof has {actual} siblings but the tree has depth {expected}")]
    WrongProofLength {
        /// Depth of the tree.
        expected: usize,
        /// Number of siblings in the proof.
        actual: usize,
    },

    /// The tree would have positions that do not fit in an `i64`.
    #[error("tree depth {depth} exceeds the maximum of {max}", max = MAX_DEPTH)]
    DepthTooLarge {
        /// Requested depth.
        depth: usize,
    },

    /// A deferred claim did not hold.
    #[error("merkle claim #{index} for leaf position {position} does not hold")]
    InvalidClaim {
        /// Index of the claim in the batch.
        index: usize,
        /// Leaf position the claim is about.
        position: i64,
    },
}

fn check_position(position: i64, depth: usize) -> MerkleResult<()> {
    if position < 0 || (depth < MAX_DEPTH && position >> depth != 0) {
        return Err(MerkleError::PositionOutOfRange { position, depth });
    }
    Ok(())
}

/// Membership proof of a single leaf.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Proof {
    /// Position of the leaf.
    #[serde(rename = "leafIndex")]
    pub path: i64,
    /// Sibling digests, from the leaf level up to the child of the root.
    pub siblings: Vec<Digest>,
}

impl Proof {
    /// Recomputes the root of the tree from `leaf` and the sibling path.
    pub fn recover_root(&self, config: &Config, leaf: &Digest) -> MerkleResult<Digest> {
        if self.siblings.len() != config.depth {
            return Err(MerkleError::WrongProofLength {
                expected: config.depth,
                actual: self.siblings.len(),
            });
        }
        check_position(self.path, config.depth)?;

        let mut current = *leaf;
        let mut idx = self.path;
        for sibling in &self.siblings {
            current = if idx & 1 == 0 {
                config.compress(&current, sibling)
            } else {
                config.compress(sibling, &current)
            };
            idx >>= 1;
        }
        Ok(current)
    }

    /// Returns whether `leaf` sits at `self.path` in a tree with root `root`.
    /// Malformed proofs never verify.
    pub fn verify(&self, config: &Config, leaf: &Digest, root: &Digest) -> bool {
        self.recover_root(config, leaf)
            .is_ok_and(|recovered| recovered == *root)
    }
}

/// A deferred membership statement: `leaf` sits at `proof.path` under `root`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MerkleClaim {
    /// Sibling path of the leaf.
    pub proof: Proof,
    /// Root the leaf is claimed to be part of.
    pub root: Digest,
    /// Digest of the leaf.
    pub leaf: Digest,
}

impl MerkleClaim {
    /// Checks the claim.
    pub fn check(&self, config: &Config) -> bool {
        self.proof.verify(config, &self.leaf, &self.root)
    }
}

/// Checks a batch of claims, reporting the first one that does not hold.
pub fn verify_claims(config: &Config, claims: &[MerkleClaim]) -> MerkleResult<()> {
    for (index, claim) in claims.iter().enumerate() {
        if !claim.check(config) {
            return Err(MerkleError::InvalidClaim {
                index,
                position: claim.proof.path,
            });
        }
    }
    Ok(())
}

/// In-memory Merkle tree with `2^depth` leaves.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    config: Config,
    /// `levels[0]` holds the leaves, `levels[depth]` the root.
    levels: Vec<HashMap<i64, Digest>>,
    empty: Vec<Digest>,
}

impl MerkleTree {
    /// Creates a tree whose leaves are all the zero digest. Fails for depths
    /// above [`MAX_DEPTH`].
    pub fn new(config: Config) -> MerkleResult<Self> {
        if config.depth > MAX_DEPTH {
            return Err(MerkleError::DepthTooLarge {
                depth: config.depth,
            });
        }

        let mut empty = Vec::with_capacity(config.depth + 1);
        empty.push(Digest::zero());
        for l in 0..config.depth {
            empty.push(config.compress(&empty[l], &empty[l]));
        }

        Ok(Self {
            config,
            levels: vec![HashMap::new(); config.depth + 1],
            empty,
        })
    }

    /// Depth of the tree.
    pub const fn depth(&self) -> usize {
        self.config.depth
    }

    /// Root of a tree at this depth holding no leaf at all.
    pub fn empty_root(&self) -> Digest {
        self.empty[self.depth()]
    }

    fn node(&self, level: usize, idx: i64) -> Digest {
        self.levels[level]
            .get(&idx)
            .copied()
            .unwrap_or(self.empty[level])
    }

    fn set_node(&mut self, level: usize, idx: i64, digest: Digest) {
        if digest == self.empty[level] {
            self.levels[level].remove(&idx);
        } else {
            self.levels[level].insert(idx, digest);
        }
    }

    /// Current root.
    pub fn root(&self) -> Digest {
        self.node(self.depth(), 0)
    }

    /// Leaf digest at `position`.
    pub fn leaf(&self, position: i64) -> MerkleResult<Digest> {
        check_position(position, self.depth())?;
        Ok(self.node(0, position))
    }

    /// Builds the membership proof of the leaf at `position`.
    pub fn prove(&self, position: i64) -> MerkleResult<Proof> {
        check_position(position, self.depth())?;
        let siblings = (0..self.depth())
            .map(|level| self.node(level, (position >> level) ^ 1))
            .collect();

        Ok(Proof {
            path: position,
            siblings,
        })
    }

    /// Sets the leaf at `position` and recomputes every ancestor.
    pub fn update(&mut self, position: i64, leaf: Digest) -> MerkleResult<()> {
        check_position(position, self.depth())?;
        self.set_node(0, position, leaf);

        let mut idx = position;
        for level in 0..self.depth() {
            let left = self.node(level, idx & !1);
            let right = self.node(level, idx | 1);
            idx >>= 1;
            let parent = self.config.compress(&left, &right);
            self.set_node(level + 1, idx, parent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ethereum_types::H256;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    const SMALL_DEPTH: usize = 4;

    fn small_config() -> Config {
        Config::keccak().with_depth(SMALL_DEPTH)
    }

    /// Computes the root by hashing every level of the dense tree.
    fn dense_root(config: &Config, leaves: &[Digest]) -> Digest {
        let mut level = leaves.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| config.compress(&pair[0], &pair[1]))
                .collect();
        }
        level[0]
    }

    #[test]
    fn sparse_tree_matches_dense_tree() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(7);
        let mut tree = MerkleTree::new(config).unwrap();
        let mut leaves = vec![Digest::zero(); 1 << SMALL_DEPTH];
        assert_eq!(tree.root(), dense_root(&config, &leaves));
        assert_eq!(tree.root(), tree.empty_root());

        for _ in 0..50 {
            let position = rng.gen_range(0..leaves.len());
            let leaf = if rng.gen_bool(0.25) {
                Digest::zero()
            } else {
                H256(rng.gen())
            };
            leaves[position] = leaf;
            tree.update(position as i64, leaf).unwrap();
            assert_eq!(tree.root(), dense_root(&config, &leaves));
        }
    }

    #[test]
    fn proofs_recover_the_root() {
        let config = small_config();
        let mut tree = MerkleTree::new(config).unwrap();
        for position in [0, 3, 9, 15] {
            tree.update(position, H256::from_low_u64_be(position as u64 + 1))
                .unwrap();
        }

        for position in 0..(1 << SMALL_DEPTH) {
            let proof = tree.prove(position).unwrap();
            let leaf = tree.leaf(position).unwrap();
            assert_eq!(proof.recover_root(&config, &leaf).unwrap(), tree.root());
            assert!(proof.verify(&config, &leaf, &tree.root()));
            assert!(!proof.verify(&config, &H256::repeat_byte(0xaa), &tree.root()));
        }
    }

    #[test]
    fn resetting_every_leaf_restores_the_empty_root() {
        let mut tree = MerkleTree::new(small_config()).unwrap();
        tree.update(5, H256::repeat_byte(1)).unwrap();
        tree.update(6, H256::repeat_byte(2)).unwrap();
        tree.update(5, Digest::zero()).unwrap();
        tree.update(6, Digest::zero()).unwrap();
        assert_eq!(tree.root(), tree.empty_root());
        assert!(tree.levels.iter().all(HashMap::is_empty));
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let config = small_config();
        let tree = MerkleTree::new(config).unwrap();
        assert_eq!(
            tree.prove(16),
            Err(MerkleError::PositionOutOfRange {
                position: 16,
                depth: SMALL_DEPTH
            })
        );
        assert!(tree.prove(-1).is_err());

        let mut proof = tree.prove(3).unwrap();
        proof.path = -3;
        assert!(proof.recover_root(&config, &Digest::zero()).is_err());
        proof.path = 3;
        proof.siblings.pop();
        assert_eq!(
            proof.recover_root(&config, &Digest::zero()),
            Err(MerkleError::WrongProofLength {
                expected: SMALL_DEPTH,
                actual: SMALL_DEPTH - 1
            })
        );
    }

    #[test]
    fn depth_is_bounded_by_the_position_type() {
        assert_eq!(
            MerkleTree::new(Config::keccak().with_depth(MAX_DEPTH + 1)).unwrap_err(),
            MerkleError::DepthTooLarge {
                depth: MAX_DEPTH + 1
            }
        );
        assert!(MerkleTree::new(Config::keccak().with_depth(100)).is_err());

        let config = Config::keccak().with_depth(MAX_DEPTH);
        let mut tree = MerkleTree::new(config).unwrap();
        let leaf = H256::repeat_byte(7);
        tree.update(i64::MAX, leaf).unwrap();
        let proof = tree.prove(i64::MAX).unwrap();
        assert_eq!(proof.siblings.len(), MAX_DEPTH);
        assert!(proof.verify(&config, &leaf, &tree.root()));
    }

    #[test]
    fn claims_are_checked_in_batch() {
        let config = small_config();
        let mut tree = MerkleTree::new(config).unwrap();
        tree.update(2, H256::repeat_byte(9)).unwrap();
        let mut claims = (0..4)
            .map(|position| MerkleClaim {
                proof: tree.prove(position).unwrap(),
                root: tree.root(),
                leaf: tree.leaf(position).unwrap(),
            })
            .collect::<Vec<_>>();
        assert_eq!(verify_claims(&config, &claims), Ok(()));

        claims[2].leaf = Digest::zero();
        assert_eq!(
            verify_claims(&config, &claims),
            Err(MerkleError::InvalidClaim {
                index: 2,
                position: 2
            })
        );
    }

    #[test]
    fn proof_json_uses_leaf_index() {
        let proof = Proof {
            path: 5,
            siblings: vec![H256::zero()],
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["leafIndex"], 5);
        assert_eq!(serde_json::from_value::<Proof>(json).unwrap(), proof);
    }
}
