//! The prover side of the accumulator.
//!
//! A [`ProverState`] owns the whole tree and every key/value it commits to.
//! Leaves are kept in a doubly-linked list sorted by hashed key, bracketed by
//! the head and tail sentinels. Each operation updates the list and the tree
//! and returns the trace a verifier needs to replay it.

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};
use thiserror::Error;

use crate::hashing::{Config, Digest};
use crate::leaf_opening::{
    KeyValueOpeningTuple, LeafOpening, FIRST_FREE_NODE, HEAD_HKEY, HEAD_INDEX, TAIL_HKEY,
    TAIL_INDEX,
};
use crate::merkle::{MerkleError, MerkleTree};
use crate::serializable::Serializable;
use crate::trace::{DeletionTrace, InsertionTrace, ReadNonZeroTrace, ReadZeroTrace, UpdateTrace};
use crate::verifier::VerifierState;

/// Stores the result of prover operations.
pub type ProverResult<T> = Result<T, ProverError>;

/// Misuse of a [`ProverState`]. These are caller bugs, not adversarial input.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ProverError {
    /// The operation requires the key to be absent.
    #[error("key with hash {hkey:#x} is already present in tree {location:?}")]
    KeyPresent {
        /// Tree the operation was run on.
        location: String,
        /// Hash of the key.
        hkey: Digest,
    },

    /// The operation requires the key to be present.
    #[error("key with hash {hkey:#x} is missing from tree {location:?}")]
    KeyMissing {
        /// Tree the operation was run on.
        location: String,
        /// Hash of the key.
        hkey: Digest,
    },

    /// The key hashes to the hashed key of a sentinel.
    #[error("key hashes to the sentinel value {0:#x}")]
    SentinelCollision(Digest),

    /// Every tree position has been handed out.
    #[error("no free leaf left at position {next_free_node} in a tree of depth {depth}")]
    TreeFull {
        /// Position the insertion would have used.
        next_free_node: i64,
        /// Depth of the tree.
        depth: usize,
    },

    /// The linked list points to an index the prover holds no record for.
    #[error("linked list points to unknown leaf {0}")]
    MissingLeaf(i64),

    /// The underlying tree rejected the operation.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

fn is_sentinel(hkey: &Digest) -> bool {
    *hkey == HEAD_HKEY || *hkey == TAIL_HKEY
}

/// Full state of one tree: the Merkle tree and every key/value it holds.
#[derive(Clone, Debug)]
pub struct ProverState<K, V> {
    location: String,
    next_free_node: i64,
    tree: MerkleTree,
    data: HashMap<i64, KeyValueOpeningTuple<K, V>>,
    config: Config,
    /// Hashed key to list index. Sentinels included.
    sorted: BTreeMap<Digest, i64>,
}

impl<K, V> ProverState<K, V>
where
    K: Serializable + Clone + Default,
    V: Serializable + Clone + Default,
{
    /// Creates a tree holding only the two sentinels.
    pub fn new(config: Config, location: impl Into<String>) -> ProverResult<Self> {
        let mut state = Self {
            location: location.into(),
            next_free_node: FIRST_FREE_NODE,
            tree: MerkleTree::new(config)?,
            data: HashMap::new(),
            config,
            sorted: BTreeMap::new(),
        };

        for (idx, opening) in [
            (HEAD_INDEX, LeafOpening::head()),
            (TAIL_INDEX, LeafOpening::tail()),
        ] {
            state.tree.update(idx, opening.hash(&config))?;
            state.sorted.insert(opening.hkey, idx);
            state.data.insert(
                idx,
                KeyValueOpeningTuple {
                    leaf_opening: opening,
                    key: K::default(),
                    value: V::default(),
                },
            );
        }

        Ok(state)
    }

    /// Identifier of the tree, stamped on every trace.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Position the next inserted leaf will take.
    pub const fn next_free_node(&self) -> i64 {
        self.next_free_node
    }

    /// Hash configuration of the tree.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying Merkle tree.
    pub const fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Every record, sentinels included, by list index.
    pub const fn data(&self) -> &HashMap<i64, KeyValueOpeningTuple<K, V>> {
        &self.data
    }

    /// Root of the Merkle tree.
    pub fn sub_tree_root(&self) -> Digest {
        self.tree.root()
    }

    /// Root binding the tree root to the free-node counter.
    pub fn top_root(&self) -> Digest {
        self.config.top_root(self.next_free_node, &self.sub_tree_root())
    }

    /// Number of keys held, sentinels excluded.
    pub fn len(&self) -> usize {
        self.sorted.len() - 2
    }

    /// Whether the tree holds no key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in increasing hashed-key order, sentinels excluded.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValueOpeningTuple<K, V>> {
        self.sorted
            .values()
            .filter(|idx| **idx >= FIRST_FREE_NODE)
            .filter_map(|idx| self.data.get(idx))
    }

    /// Snapshot of the roots, for a verifier to replay further traces.
    pub fn verifier_state(&self) -> VerifierState<K, V> {
        VerifierState::new(
            self.location.clone(),
            self.next_free_node,
            self.sub_tree_root(),
            self.config,
        )
    }

    /// List index of the leaf holding `key`, if any.
    pub fn find_key(&self, key: &K) -> Option<i64> {
        let hkey = self.config.hash(key);
        if is_sentinel(&hkey) {
            return None;
        }
        self.sorted.get(&hkey).copied()
    }

    /// Value bound to `key`, if any.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_key(key)
            .and_then(|idx| self.data.get(&idx))
            .map(|tuple| &tuple.value)
    }

    fn hashed_key(&self, key: &K) -> ProverResult<Digest> {
        let hkey = self.config.hash(key);
        if is_sentinel(&hkey) {
            return Err(ProverError::SentinelCollision(hkey));
        }
        Ok(hkey)
    }

    fn present_index(&self, hkey: Digest) -> ProverResult<i64> {
        self.sorted
            .get(&hkey)
            .copied()
            .ok_or_else(|| ProverError::KeyMissing {
                location: self.location.clone(),
                hkey,
            })
    }

    fn check_absent(&self, hkey: Digest) -> ProverResult<()> {
        if self.sorted.contains_key(&hkey) {
            return Err(ProverError::KeyPresent {
                location: self.location.clone(),
                hkey,
            });
        }
        Ok(())
    }

    fn record(&self, idx: i64) -> ProverResult<&KeyValueOpeningTuple<K, V>> {
        self.data.get(&idx).ok_or(ProverError::MissingLeaf(idx))
    }

    fn opening(&self, idx: i64) -> ProverResult<LeafOpening> {
        self.record(idx).map(|tuple| tuple.leaf_opening)
    }

    /// Indices of the two adjacent leaves sandwiching an absent `hkey`.
    fn sandwich(&self, hkey: Digest) -> ProverResult<(i64, i64)> {
        let minus = self
            .sorted
            .range(..hkey)
            .next_back()
            .map(|(_, idx)| *idx)
            .ok_or(ProverError::MissingLeaf(HEAD_INDEX))?;
        let plus = self.opening(minus)?.next;
        Ok((minus, plus))
    }

    /// Writes `opening` at `idx`, in the tree and in the records.
    fn set_opening(&mut self, idx: i64, opening: LeafOpening) -> ProverResult<()> {
        self.tree.update(idx, opening.hash(&self.config))?;
        self.data
            .get_mut(&idx)
            .ok_or(ProverError::MissingLeaf(idx))?
            .leaf_opening = opening;
        Ok(())
    }

    /// Proves that `key` is absent.
    pub fn read_zero_and_prove(&self, key: &K) -> ProverResult<ReadZeroTrace<K>> {
        let hkey = self.hashed_key(key)?;
        self.check_absent(hkey)?;
        let (minus, plus) = self.sandwich(hkey)?;
        trace!(
            "{}: read-zero of {:#x} between leaves {} and {}",
            self.location,
            hkey,
            minus,
            plus
        );

        Ok(ReadZeroTrace {
            location: self.location.clone(),
            key: key.clone(),
            sub_root: self.sub_tree_root(),
            next_free_node: self.next_free_node,
            opening_minus: self.opening(minus)?,
            opening_plus: self.opening(plus)?,
            proof_minus: self.tree.prove(minus)?,
            proof_plus: self.tree.prove(plus)?,
        })
    }

    /// Proves that `key` is present, along with its value.
    pub fn read_non_zero_and_prove(&self, key: &K) -> ProverResult<ReadNonZeroTrace<K, V>> {
        let hkey = self.hashed_key(key)?;
        let idx = self.present_index(hkey)?;
        let tuple = self.record(idx)?;
        trace!("{}: read of {:#x} at leaf {}", self.location, hkey, idx);

        Ok(ReadNonZeroTrace {
            location: self.location.clone(),
            key: key.clone(),
            value: tuple.value.clone(),
            sub_root: self.sub_tree_root(),
            next_free_node: self.next_free_node,
            leaf_opening: tuple.leaf_opening,
            proof: self.tree.prove(idx)?,
        })
    }

    /// Inserts an absent `key` at the next free position, between its two
    /// neighbours in hashed-key order.
    pub fn insert_and_prove(&mut self, key: K, value: V) -> ProverResult<InsertionTrace<K, V>> {
        let hkey = self.hashed_key(&key)?;
        self.check_absent(hkey)?;
        let new_idx = self.next_free_node;
        if self.tree.leaf(new_idx).is_err() {
            return Err(ProverError::TreeFull {
                next_free_node: new_idx,
                depth: self.tree.depth(),
            });
        }

        let (minus, plus) = self.sandwich(hkey)?;
        let old_sub_root = self.sub_tree_root();
        debug!(
            "{}: inserting {:#x} at leaf {} between {} and {}",
            self.location, hkey, new_idx, minus, plus
        );

        let old_open_minus = self.opening(minus)?;
        let proof_minus = self.tree.prove(minus)?;
        self.set_opening(
            minus,
            LeafOpening {
                next: new_idx,
                ..old_open_minus
            },
        )?;

        let new_leaf = LeafOpening {
            prev: minus,
            next: plus,
            hkey,
            hval: self.config.hash(&value),
        };
        let proof_new = self.tree.prove(new_idx)?;
        self.tree.update(new_idx, new_leaf.hash(&self.config))?;
        self.data.insert(
            new_idx,
            KeyValueOpeningTuple {
                leaf_opening: new_leaf,
                key: key.clone(),
                value: value.clone(),
            },
        );
        self.sorted.insert(hkey, new_idx);

        let old_open_plus = self.opening(plus)?;
        let proof_plus = self.tree.prove(plus)?;
        self.set_opening(
            plus,
            LeafOpening {
                prev: new_idx,
                ..old_open_plus
            },
        )?;

        self.next_free_node += 1;

        Ok(InsertionTrace {
            location: self.location.clone(),
            key,
            value,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            new_next_free_node: self.next_free_node,
            old_open_minus,
            old_open_plus,
            proof_minus,
            proof_new,
            proof_plus,
        })
    }

    /// Binds a present `key` to `value`.
    pub fn update_and_prove(&mut self, key: &K, value: V) -> ProverResult<UpdateTrace<K, V>> {
        let hkey = self.hashed_key(key)?;
        let idx = self.present_index(hkey)?;
        let old_sub_root = self.sub_tree_root();
        let old_opening = self.opening(idx)?;
        let proof = self.tree.prove(idx)?;
        debug!("{}: updating {:#x} at leaf {}", self.location, hkey, idx);

        self.set_opening(
            idx,
            LeafOpening {
                hval: self.config.hash(&value),
                ..old_opening
            },
        )?;
        let old_value = match self.data.get_mut(&idx) {
            Some(tuple) => std::mem::replace(&mut tuple.value, value.clone()),
            None => return Err(ProverError::MissingLeaf(idx)),
        };

        Ok(UpdateTrace {
            location: self.location.clone(),
            key: key.clone(),
            old_value,
            new_value: value,
            old_opening,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            new_next_free_node: self.next_free_node,
            proof,
        })
    }

    /// Unlinks a present `key` and clears its tree slot. The slot is never
    /// handed out again.
    pub fn delete_and_prove(&mut self, key: &K) -> ProverResult<DeletionTrace<K, V>> {
        let hkey = self.hashed_key(key)?;
        let idx = self.present_index(hkey)?;
        let old_sub_root = self.sub_tree_root();
        let deleted_open = self.opening(idx)?;
        let (minus, plus) = (deleted_open.prev, deleted_open.next);
        debug!(
            "{}: deleting {:#x} at leaf {} between {} and {}",
            self.location, hkey, idx, minus, plus
        );

        let old_open_minus = self.opening(minus)?;
        let proof_minus = self.tree.prove(minus)?;
        self.set_opening(
            minus,
            LeafOpening {
                next: plus,
                ..old_open_minus
            },
        )?;

        let proof_deleted = self.tree.prove(idx)?;
        self.tree.update(idx, Digest::zero())?;
        let deleted = self.data.remove(&idx).ok_or(ProverError::MissingLeaf(idx))?;
        self.sorted.remove(&hkey);

        let old_open_plus = self.opening(plus)?;
        let proof_plus = self.tree.prove(plus)?;
        self.set_opening(
            plus,
            LeafOpening {
                prev: minus,
                ..old_open_plus
            },
        )?;

        Ok(DeletionTrace {
            location: self.location.clone(),
            key: key.clone(),
            deleted_value: deleted.value,
            old_sub_root,
            new_sub_root: self.sub_tree_root(),
            new_next_free_node: self.next_free_node,
            old_open_minus,
            deleted_open,
            old_open_plus,
            proof_minus,
            proof_deleted,
            proof_plus,
        })
    }
}
