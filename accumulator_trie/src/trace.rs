//! Traces emitted by the prover for each operation.
//!
//! A trace carries everything a [`VerifierState`][crate::verifier::VerifierState]
//! needs to replay the operation against the root it tracks: the key (and
//! value), the openings of every touched leaf before the operation, one proof
//! per touched leaf, and the sub-tree roots before and after.
//!
//! Mutating traces touch several leaves in sequence. The proof of each leaf is
//! taken on the tree as left by the previous leaf update, so the roots between
//! two updates are never shipped: they are recovered from the proofs.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::hashing::{Config, Digest};
use crate::leaf_opening::LeafOpening;
use crate::merkle::{MerkleClaim, MerkleResult, Proof};
use crate::serializable::Serializable;

/// Proof that a key is absent: the two adjacent leaves sandwiching its hash.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadZeroTrace<K> {
    /// Tree the trace applies to.
    pub location: String,
    /// The absent key.
    pub key: K,
    /// Root of the tree.
    pub sub_root: Digest,
    /// Free-node counter of the tree.
    pub next_free_node: i64,
    /// Leaf with the largest hashed key below `hash(key)`.
    #[serde(rename = "leftLeaf")]
    pub opening_minus: LeafOpening,
    /// Leaf with the smallest hashed key above `hash(key)`.
    #[serde(rename = "rightLeaf")]
    pub opening_plus: LeafOpening,
    /// Proof of `opening_minus`.
    #[serde(rename = "leftProof")]
    pub proof_minus: Proof,
    /// Proof of `opening_plus`.
    #[serde(rename = "rightProof")]
    pub proof_plus: Proof,
}

/// Proof that a key is present with a given value.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNonZeroTrace<K, V> {
    /// Tree the trace applies to.
    pub location: String,
    /// The key read.
    pub key: K,
    /// Its value.
    pub value: V,
    /// Root of the tree.
    pub sub_root: Digest,
    /// Free-node counter of the tree.
    pub next_free_node: i64,
    /// Opening of the leaf holding the key.
    #[serde(rename = "leaf")]
    pub leaf_opening: LeafOpening,
    /// Proof of `leaf_opening`.
    pub proof: Proof,
}

/// Insertion of a fresh key at the next free tree position.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionTrace<K, V> {
    /// Tree the trace applies to.
    pub location: String,
    /// Inserted key.
    pub key: K,
    /// Inserted value.
    pub value: V,
    /// Root before the insertion.
    pub old_sub_root: Digest,
    /// Root after the insertion.
    pub new_sub_root: Digest,
    /// Free-node counter after the insertion.
    pub new_next_free_node: i64,
    /// Predecessor before its `next` pointer was rewritten.
    #[serde(rename = "priorLeftLeaf")]
    pub old_open_minus: LeafOpening,
    /// Successor before its `prev` pointer was rewritten.
    #[serde(rename = "priorRightLeaf")]
    pub old_open_plus: LeafOpening,
    /// Proof of the predecessor, on the tree before the operation.
    #[serde(rename = "leftProof")]
    pub proof_minus: Proof,
    /// Proof of the empty slot, once the predecessor was updated.
    #[serde(rename = "newProof")]
    pub proof_new: Proof,
    /// Proof of the successor, once the new leaf was written.
    #[serde(rename = "rightProof")]
    pub proof_plus: Proof,
}

/// Change of the value bound to a present key.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrace<K, V> {
    /// Tree the trace applies to.
    pub location: String,
    /// Updated key.
    pub key: K,
    /// Value before the update.
    pub old_value: V,
    /// Value after the update.
    pub new_value: V,
    /// Opening of the leaf before the update.
    #[serde(rename = "priorUpdatedLeaf")]
    pub old_opening: LeafOpening,
    /// Root before the update.
    pub old_sub_root: Digest,
    /// Root after the update.
    pub new_sub_root: Digest,
    /// Free-node counter, left untouched by updates.
    pub new_next_free_node: i64,
    /// Proof of the updated leaf.
    pub proof: Proof,
}

/// Removal of a present key from the list.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionTrace<K, V> {
    /// Tree the trace applies to.
    pub location: String,
    /// Deleted key.
    pub key: K,
    /// Value bound to the key before the deletion.
    pub deleted_value: V,
    /// Root before the deletion.
    pub old_sub_root: Digest,
    /// Root after the deletion.
    pub new_sub_root: Digest,
    /// Free-node counter, left untouched by deletions.
    pub new_next_free_node: i64,
    /// Predecessor before its `next` pointer was rewritten.
    #[serde(rename = "priorLeftLeaf")]
    pub old_open_minus: LeafOpening,
    /// Opening of the deleted leaf.
    #[serde(rename = "priorDeletedLeaf")]
    pub deleted_open: LeafOpening,
    /// Successor before its `prev` pointer was rewritten.
    #[serde(rename = "priorRightLeaf")]
    pub old_open_plus: LeafOpening,
    /// Proof of the predecessor, on the tree before the operation.
    #[serde(rename = "leftProof")]
    pub proof_minus: Proof,
    /// Proof of the deleted leaf, once the predecessor was updated.
    #[serde(rename = "deletedProof")]
    pub proof_deleted: Proof,
    /// Proof of the successor, once the deleted slot was cleared.
    #[serde(rename = "rightProof")]
    pub proof_plus: Proof,
}

/// The five kinds of operation, with their wire codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationKind {
    /// Non-membership read.
    ReadZero,
    /// Membership read.
    ReadNonZero,
    /// Insertion.
    Insertion,
    /// Update.
    Update,
    /// Deletion.
    Deletion,
}

impl OperationKind {
    /// Code used in the `type` field of serialized traces.
    pub const fn code(self) -> u8 {
        match self {
            Self::ReadNonZero => 0,
            Self::ReadZero => 1,
            Self::Insertion => 2,
            Self::Update => 3,
            Self::Deletion => 4,
        }
    }

    /// Inverse of [`OperationKind::code`].
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::ReadNonZero,
            1 => Self::ReadZero,
            2 => Self::Insertion,
            3 => Self::Update,
            4 => Self::Deletion,
            _ => return None,
        })
    }

    /// `0` for reads, `1` for writes.
    pub const fn rw_flag(self) -> u8 {
        match self {
            Self::ReadZero | Self::ReadNonZero => 0,
            Self::Insertion | Self::Update | Self::Deletion => 1,
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadZero => "ReadZero",
            Self::ReadNonZero => "ReadNonZero",
            Self::Insertion => "Insertion",
            Self::Update => "Update",
            Self::Deletion => "Deletion",
        };
        f.write_str(name)
    }
}

/// Which leaf of an operation a proof is about.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LeafRole {
    /// Predecessor of the key in the list.
    Minus,
    /// Successor of the key in the list.
    Plus,
    /// Slot receiving an inserted leaf.
    New,
    /// Slot of a deleted leaf.
    Deleted,
    /// Leaf holding the key itself.
    Target,
}

impl Display for LeafRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Minus => "left neighbour",
            Self::Plus => "right neighbour",
            Self::New => "new",
            Self::Deleted => "deleted",
            Self::Target => "target",
        };
        f.write_str(name)
    }
}

/// One leaf update of a mutating operation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LeafTransition<'a> {
    pub(crate) role: LeafRole,
    pub(crate) proof: &'a Proof,
    pub(crate) old_leaf: Digest,
    pub(crate) new_leaf: Digest,
}

impl<K: Serializable, V: Serializable> InsertionTrace<K, V> {
    /// Opening of the inserted leaf, linked between the two neighbours.
    pub fn new_leaf(&self, config: &Config) -> LeafOpening {
        LeafOpening {
            prev: self.proof_minus.path,
            next: self.proof_plus.path,
            hkey: config.hash(&self.key),
            hval: config.hash(&self.value),
        }
    }

    pub(crate) fn transitions(&self, config: &Config) -> [LeafTransition<'_>; 3] {
        let new_index = self.proof_new.path;
        let new_minus = LeafOpening {
            next: new_index,
            ..self.old_open_minus
        };
        let new_plus = LeafOpening {
            prev: new_index,
            ..self.old_open_plus
        };

        [
            LeafTransition {
                role: LeafRole::Minus,
                proof: &self.proof_minus,
                old_leaf: self.old_open_minus.hash(config),
                new_leaf: new_minus.hash(config),
            },
            LeafTransition {
                role: LeafRole::New,
                proof: &self.proof_new,
                old_leaf: Digest::zero(),
                new_leaf: self.new_leaf(config).hash(config),
            },
            LeafTransition {
                role: LeafRole::Plus,
                proof: &self.proof_plus,
                old_leaf: self.old_open_plus.hash(config),
                new_leaf: new_plus.hash(config),
            },
        ]
    }
}

impl<K, V: Serializable> UpdateTrace<K, V> {
    /// Opening of the leaf after the update.
    pub fn new_opening(&self, config: &Config) -> LeafOpening {
        LeafOpening {
            hval: config.hash(&self.new_value),
            ..self.old_opening
        }
    }

    pub(crate) fn transitions(&self, config: &Config) -> [LeafTransition<'_>; 1] {
        [LeafTransition {
            role: LeafRole::Target,
            proof: &self.proof,
            old_leaf: self.old_opening.hash(config),
            new_leaf: self.new_opening(config).hash(config),
        }]
    }
}

impl<K, V> DeletionTrace<K, V> {
    pub(crate) fn transitions(&self, config: &Config) -> [LeafTransition<'_>; 3] {
        let new_minus = LeafOpening {
            next: self.proof_plus.path,
            ..self.old_open_minus
        };
        let new_plus = LeafOpening {
            prev: self.proof_minus.path,
            ..self.old_open_plus
        };

        [
            LeafTransition {
                role: LeafRole::Minus,
                proof: &self.proof_minus,
                old_leaf: self.old_open_minus.hash(config),
                new_leaf: new_minus.hash(config),
            },
            LeafTransition {
                role: LeafRole::Deleted,
                proof: &self.proof_deleted,
                old_leaf: self.deleted_open.hash(config),
                new_leaf: Digest::zero(),
            },
            LeafTransition {
                role: LeafRole::Plus,
                proof: &self.proof_plus,
                old_leaf: self.old_open_plus.hash(config),
                new_leaf: new_plus.hash(config),
            },
        ]
    }
}

/// Claims implied by a chain of leaf updates starting from `root`: each old
/// leaf against the root reached so far, then the last new leaf against
/// `new_root`.
fn append_transition_claims(
    config: &Config,
    mut root: Digest,
    new_root: Digest,
    transitions: &[LeafTransition<'_>],
    claims: &mut Vec<MerkleClaim>,
) -> MerkleResult<()> {
    for transition in transitions {
        claims.push(MerkleClaim {
            proof: transition.proof.clone(),
            root,
            leaf: transition.old_leaf,
        });
        root = transition.proof.recover_root(config, &transition.new_leaf)?;
    }
    if let Some(last) = transitions.last() {
        claims.push(MerkleClaim {
            proof: last.proof.clone(),
            root: new_root,
            leaf: last.new_leaf,
        });
    }
    Ok(())
}

/// Any trace over a tree with keys `K` and values `V`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Trace<K, V> {
    /// See [`ReadZeroTrace`].
    ReadZero(ReadZeroTrace<K>),
    /// See [`ReadNonZeroTrace`].
    ReadNonZero(ReadNonZeroTrace<K, V>),
    /// See [`InsertionTrace`].
    Insertion(InsertionTrace<K, V>),
    /// See [`UpdateTrace`].
    Update(UpdateTrace<K, V>),
    /// See [`DeletionTrace`].
    Deletion(DeletionTrace<K, V>),
}

impl<K, V> Trace<K, V> {
    /// Kind of operation.
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::ReadZero(_) => OperationKind::ReadZero,
            Self::ReadNonZero(_) => OperationKind::ReadNonZero,
            Self::Insertion(_) => OperationKind::Insertion,
            Self::Update(_) => OperationKind::Update,
            Self::Deletion(_) => OperationKind::Deletion,
        }
    }

    /// `0` for reads, `1` for writes.
    pub const fn rw_flag(&self) -> u8 {
        self.kind().rw_flag()
    }

    /// Tree the trace applies to.
    pub fn location(&self) -> &str {
        match self {
            Self::ReadZero(t) => &t.location,
            Self::ReadNonZero(t) => &t.location,
            Self::Insertion(t) => &t.location,
            Self::Update(t) => &t.location,
            Self::Deletion(t) => &t.location,
        }
    }

    /// Key the trace is about.
    pub const fn key(&self) -> &K {
        match self {
            Self::ReadZero(t) => &t.key,
            Self::ReadNonZero(t) => &t.key,
            Self::Insertion(t) => &t.key,
            Self::Update(t) => &t.key,
            Self::Deletion(t) => &t.key,
        }
    }

    /// Root the trace starts from.
    pub const fn old_sub_root(&self) -> Digest {
        match self {
            Self::ReadZero(t) => t.sub_root,
            Self::ReadNonZero(t) => t.sub_root,
            Self::Insertion(t) => t.old_sub_root,
            Self::Update(t) => t.old_sub_root,
            Self::Deletion(t) => t.old_sub_root,
        }
    }

    /// Root the trace ends at. Reads leave the root unchanged.
    pub const fn new_sub_root(&self) -> Digest {
        match self {
            Self::ReadZero(t) => t.sub_root,
            Self::ReadNonZero(t) => t.sub_root,
            Self::Insertion(t) => t.new_sub_root,
            Self::Update(t) => t.new_sub_root,
            Self::Deletion(t) => t.new_sub_root,
        }
    }

    /// Free-node counter after the operation.
    pub const fn new_next_free_node(&self) -> i64 {
        match self {
            Self::ReadZero(t) => t.next_free_node,
            Self::ReadNonZero(t) => t.next_free_node,
            Self::Insertion(t) => t.new_next_free_node,
            Self::Update(t) => t.new_next_free_node,
            Self::Deletion(t) => t.new_next_free_node,
        }
    }

    /// Free-node counter before the operation. Only insertions move it.
    pub const fn old_next_free_node(&self) -> i64 {
        match self {
            Self::Insertion(t) => t.new_next_free_node.saturating_sub(1),
            _ => self.new_next_free_node(),
        }
    }
}

impl<K: Serializable, V: Serializable> Trace<K, V> {
    /// Hash of the key the trace is about.
    pub fn hkey(&self, config: &Config) -> Digest {
        config.hash(self.key())
    }

    /// Appends to `claims` every Merkle membership statement this trace relies
    /// on, for callers that batch the proof checks.
    ///
    /// Only the openings are covered. The sandwich and pointer conditions are
    /// checked by the verifier.
    pub fn append_merkle_claims(
        &self,
        config: &Config,
        claims: &mut Vec<MerkleClaim>,
    ) -> MerkleResult<()> {
        match self {
            Self::ReadZero(t) => {
                claims.push(MerkleClaim {
                    proof: t.proof_minus.clone(),
                    root: t.sub_root,
                    leaf: t.opening_minus.hash(config),
                });
                claims.push(MerkleClaim {
                    proof: t.proof_plus.clone(),
                    root: t.sub_root,
                    leaf: t.opening_plus.hash(config),
                });
                Ok(())
            }
            Self::ReadNonZero(t) => {
                claims.push(MerkleClaim {
                    proof: t.proof.clone(),
                    root: t.sub_root,
                    leaf: t.leaf_opening.hash(config),
                });
                Ok(())
            }
            Self::Insertion(t) => append_transition_claims(
                config,
                t.old_sub_root,
                t.new_sub_root,
                &t.transitions(config),
                claims,
            ),
            Self::Update(t) => append_transition_claims(
                config,
                t.old_sub_root,
                t.new_sub_root,
                &t.transitions(config),
                claims,
            ),
            Self::Deletion(t) => append_transition_claims(
                config,
                t.old_sub_root,
                t.new_sub_root,
                &t.transitions(config),
                claims,
            ),
        }
    }
}

impl<K, V> From<ReadZeroTrace<K>> for Trace<K, V> {
    fn from(t: ReadZeroTrace<K>) -> Self {
        Self::ReadZero(t)
    }
}

impl<K, V> From<ReadNonZeroTrace<K, V>> for Trace<K, V> {
    fn from(t: ReadNonZeroTrace<K, V>) -> Self {
        Self::ReadNonZero(t)
    }
}

impl<K, V> From<InsertionTrace<K, V>> for Trace<K, V> {
    fn from(t: InsertionTrace<K, V>) -> Self {
        Self::Insertion(t)
    }
}

impl<K, V> From<UpdateTrace<K, V>> for Trace<K, V> {
    fn from(t: UpdateTrace<K, V>) -> Self {
        Self::Update(t)
    }
}

impl<K, V> From<DeletionTrace<K, V>> for Trace<K, V> {
    fn from(t: DeletionTrace<K, V>) -> Self {
        Self::Deletion(t)
    }
}
