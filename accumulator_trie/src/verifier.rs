//! The verifier side of the accumulator.
//!
//! A [`VerifierState`] only tracks the root of one tree and its free-node
//! counter. It accepts a trace when the trace starts from that root, its
//! openings are consistent with the key and value it claims, and its proofs
//! replay to the claimed new root. Mutating traces are committed only once
//! every check passed, so a rejected trace leaves the state untouched.

use std::fmt::{self, Debug};
use std::marker::PhantomData;

use log::{trace, warn};
use thiserror::Error;

use crate::hashing::{Config, Digest};
use crate::leaf_opening::LeafOpening;
use crate::merkle::{MerkleError, Proof};
use crate::serializable::Serializable;
use crate::trace::{
    DeletionTrace, InsertionTrace, LeafRole, LeafTransition, ReadNonZeroTrace, ReadZeroTrace,
    Trace, UpdateTrace,
};

/// Stores the result of trace verification.
pub type VerifierResult<T> = Result<T, VerifierError>;

/// Reason a trace was rejected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum VerifierError {
    /// The trace was produced for another tree.
    #[error("trace is for tree {actual:?} but the verifier tracks {expected:?}")]
    LocationMismatch {
        /// Tree tracked by the verifier.
        expected: String,
        /// Tree named by the trace.
        actual: String,
    },

    /// The trace does not start from the tracked root.
    #[error("trace starts from root {actual:#x} but the verifier is at {expected:#x}")]
    RootMismatch {
        /// Root tracked by the verifier.
        expected: Digest,
        /// Root the trace starts from.
        actual: Digest,
    },

    /// The free-node counter of the trace disagrees with the verifier.
    #[error("trace claims next free node {actual}, expected {expected}")]
    NextFreeNodeMismatch {
        /// Value implied by the verifier state.
        expected: i64,
        /// Value carried by the trace.
        actual: i64,
    },

    /// The neighbours of a key do not bracket its hash.
    #[error("hashed key {hkey:#x} is not strictly between {minus:#x} and {plus:#x}")]
    BadSandwich {
        /// Hashed key of the left neighbour.
        minus: Digest,
        /// Hashed key of the operation.
        hkey: Digest,
        /// Hashed key of the right neighbour.
        plus: Digest,
    },

    /// A list pointer does not designate the expected leaf.
    #[error("{role} leaf points to {actual} instead of {expected}")]
    BadPointer {
        /// Leaf carrying the pointer.
        role: LeafRole,
        /// Index the pointer should hold.
        expected: i64,
        /// Index it holds.
        actual: i64,
    },

    /// An opening does not commit to the key or value of the trace.
    #[error("{role} leaf opening {opening} does not match the {field} of the trace")]
    OpeningMismatch {
        /// Leaf being checked.
        role: LeafRole,
        /// `"key"` or `"value"`.
        field: &'static str,
        /// The offending opening.
        opening: LeafOpening,
    },

    /// A proof does not open the expected leaf under the current root.
    #[error("proof of the {role} leaf at position {position} does not match the root")]
    ProofFailed {
        /// Leaf being proven.
        role: LeafRole,
        /// Position the proof is for.
        position: i64,
    },

    /// Replaying the leaf updates does not reach the claimed new root.
    #[error("trace claims new root {claimed:#x} but replay gives {recovered:#x}")]
    NewRootMismatch {
        /// New root carried by the trace.
        claimed: Digest,
        /// Root recovered from the proofs.
        recovered: Digest,
    },

    /// A proof is malformed.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// Root and free-node counter of one tree, advanced only by verified traces.
pub struct VerifierState<K, V> {
    /// Tree the state tracks.
    pub location: String,
    /// Position the next insertion must use.
    pub next_free_node: i64,
    /// Current root of the tree.
    pub sub_tree_root: Digest,
    /// Hash configuration of the tree.
    pub config: Config,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for VerifierState<K, V> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            next_free_node: self.next_free_node,
            sub_tree_root: self.sub_tree_root,
            config: self.config,
            _marker: PhantomData,
        }
    }
}

impl<K, V> Debug for VerifierState<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierState")
            .field("location", &self.location)
            .field("next_free_node", &self.next_free_node)
            .field("sub_tree_root", &self.sub_tree_root)
            .field("depth", &self.config.depth)
            .finish()
    }
}

fn check_sandwich(minus: &LeafOpening, hkey: Digest, plus: &LeafOpening) -> VerifierResult<()> {
    if minus.hkey < hkey && hkey < plus.hkey {
        return Ok(());
    }
    Err(VerifierError::BadSandwich {
        minus: minus.hkey,
        hkey,
        plus: plus.hkey,
    })
}

fn check_pointer(role: LeafRole, expected: i64, actual: i64) -> VerifierResult<()> {
    if expected == actual {
        return Ok(());
    }
    Err(VerifierError::BadPointer {
        role,
        expected,
        actual,
    })
}

fn check_counter(expected: i64, actual: i64) -> VerifierResult<()> {
    if expected == actual {
        return Ok(());
    }
    Err(VerifierError::NextFreeNodeMismatch { expected, actual })
}

impl<K, V> VerifierState<K, V> {
    /// Starts tracking a tree from the given roots.
    pub fn new(
        location: impl Into<String>,
        next_free_node: i64,
        sub_tree_root: Digest,
        config: Config,
    ) -> Self {
        Self {
            location: location.into(),
            next_free_node,
            sub_tree_root,
            config,
            _marker: PhantomData,
        }
    }

    /// Root binding the tree root to the free-node counter.
    pub fn top_root(&self) -> Digest {
        self.config
            .top_root(self.next_free_node, &self.sub_tree_root)
    }

    fn check_header(&self, location: &str, old_root: Digest) -> VerifierResult<()> {
        if location != self.location {
            return Err(VerifierError::LocationMismatch {
                expected: self.location.clone(),
                actual: location.to_owned(),
            });
        }
        if old_root != self.sub_tree_root {
            return Err(VerifierError::RootMismatch {
                expected: self.sub_tree_root,
                actual: old_root,
            });
        }
        Ok(())
    }

    fn check_proof(
        &self,
        role: LeafRole,
        proof: &Proof,
        leaf: &Digest,
        root: &Digest,
    ) -> VerifierResult<()> {
        if proof.recover_root(&self.config, leaf)? != *root {
            return Err(VerifierError::ProofFailed {
                role,
                position: proof.path,
            });
        }
        Ok(())
    }

    /// Applies chained leaf updates from the tracked root, checking each old
    /// leaf against the root reached so far. Returns the final root.
    fn replay(&self, transitions: &[LeafTransition<'_>]) -> VerifierResult<Digest> {
        let mut root = self.sub_tree_root;
        for transition in transitions {
            self.check_proof(
                transition.role,
                transition.proof,
                &transition.old_leaf,
                &root,
            )?;
            root = transition
                .proof
                .recover_root(&self.config, &transition.new_leaf)?;
        }
        Ok(root)
    }

    fn commit(&mut self, claimed: Digest, recovered: Digest) -> VerifierResult<()> {
        if claimed != recovered {
            return Err(VerifierError::NewRootMismatch { claimed, recovered });
        }
        trace!(
            "{}: root {:#x} -> {:#x}",
            self.location,
            self.sub_tree_root,
            claimed
        );
        self.sub_tree_root = claimed;
        Ok(())
    }
}

impl<K: Serializable, V: Serializable> VerifierState<K, V> {
    /// Checks a proof of absence. Never changes the state.
    pub fn verify_read_zero(&self, trace: &ReadZeroTrace<K>) -> VerifierResult<()> {
        self.check_header(&trace.location, trace.sub_root)?;
        check_counter(self.next_free_node, trace.next_free_node)?;

        let hkey = self.config.hash(&trace.key);
        check_sandwich(&trace.opening_minus, hkey, &trace.opening_plus)?;
        check_pointer(
            LeafRole::Minus,
            trace.proof_plus.path,
            trace.opening_minus.next,
        )?;
        check_pointer(
            LeafRole::Plus,
            trace.proof_minus.path,
            trace.opening_plus.prev,
        )?;

        self.check_proof(
            LeafRole::Minus,
            &trace.proof_minus,
            &trace.opening_minus.hash(&self.config),
            &self.sub_tree_root,
        )?;
        self.check_proof(
            LeafRole::Plus,
            &trace.proof_plus,
            &trace.opening_plus.hash(&self.config),
            &self.sub_tree_root,
        )
    }

    /// Checks a proof of membership. Never changes the state.
    pub fn verify_read_non_zero(&self, trace: &ReadNonZeroTrace<K, V>) -> VerifierResult<()> {
        self.check_header(&trace.location, trace.sub_root)?;
        check_counter(self.next_free_node, trace.next_free_node)?;
        self.check_opening(&trace.leaf_opening, &trace.key, &trace.value)?;

        self.check_proof(
            LeafRole::Target,
            &trace.proof,
            &trace.leaf_opening.hash(&self.config),
            &self.sub_tree_root,
        )
    }

    /// Checks an insertion and, if valid, moves to its new root and bumps the
    /// free-node counter.
    pub fn verify_insertion(&mut self, trace: &InsertionTrace<K, V>) -> VerifierResult<()> {
        self.check_header(&trace.location, trace.old_sub_root)?;
        check_counter(self.next_free_node, trace.proof_new.path)?;
        let next_free_node = self.next_free_node.checked_add(1).ok_or(
            VerifierError::NextFreeNodeMismatch {
                expected: self.next_free_node,
                actual: trace.new_next_free_node,
            },
        )?;
        check_counter(next_free_node, trace.new_next_free_node)?;

        let hkey = self.config.hash(&trace.key);
        check_sandwich(&trace.old_open_minus, hkey, &trace.old_open_plus)?;
        check_pointer(
            LeafRole::Minus,
            trace.proof_plus.path,
            trace.old_open_minus.next,
        )?;
        check_pointer(
            LeafRole::Plus,
            trace.proof_minus.path,
            trace.old_open_plus.prev,
        )?;

        let recovered = self.replay(&trace.transitions(&self.config))?;
        self.commit(trace.new_sub_root, recovered)?;
        self.next_free_node = trace.new_next_free_node;
        Ok(())
    }

    /// Checks an update and, if valid, moves to its new root.
    pub fn verify_update(&mut self, trace: &UpdateTrace<K, V>) -> VerifierResult<()> {
        self.check_header(&trace.location, trace.old_sub_root)?;
        check_counter(self.next_free_node, trace.new_next_free_node)?;
        self.check_opening(&trace.old_opening, &trace.key, &trace.old_value)?;

        let recovered = self.replay(&trace.transitions(&self.config))?;
        self.commit(trace.new_sub_root, recovered)
    }

    /// Checks a deletion and, if valid, moves to its new root.
    pub fn verify_deletion(&mut self, trace: &DeletionTrace<K, V>) -> VerifierResult<()> {
        self.check_header(&trace.location, trace.old_sub_root)?;
        check_counter(self.next_free_node, trace.new_next_free_node)?;
        self.check_opening(&trace.deleted_open, &trace.key, &trace.deleted_value)?;

        let deleted = trace.proof_deleted.path;
        check_pointer(LeafRole::Minus, deleted, trace.old_open_minus.next)?;
        check_pointer(LeafRole::Plus, deleted, trace.old_open_plus.prev)?;
        check_pointer(
            LeafRole::Deleted,
            trace.proof_minus.path,
            trace.deleted_open.prev,
        )?;
        check_pointer(
            LeafRole::Deleted,
            trace.proof_plus.path,
            trace.deleted_open.next,
        )?;

        let recovered = self.replay(&trace.transitions(&self.config))?;
        self.commit(trace.new_sub_root, recovered)
    }

    /// Dispatches on the kind of trace. Rejections are logged.
    pub fn verify_trace(&mut self, trace: &Trace<K, V>) -> VerifierResult<()> {
        let res = match trace {
            Trace::ReadZero(t) => self.verify_read_zero(t),
            Trace::ReadNonZero(t) => self.verify_read_non_zero(t),
            Trace::Insertion(t) => self.verify_insertion(t),
            Trace::Update(t) => self.verify_update(t),
            Trace::Deletion(t) => self.verify_deletion(t),
        };
        res.inspect_err(|err| {
            warn!(
                "{}: rejected {} trace: {}",
                self.location,
                trace.kind(),
                err
            )
        })
    }

    fn check_opening(&self, opening: &LeafOpening, key: &K, value: &V) -> VerifierResult<()> {
        let role = LeafRole::Target;
        if opening.hkey != self.config.hash(key) {
            return Err(VerifierError::OpeningMismatch {
                role,
                field: "key",
                opening: *opening,
            });
        }
        if opening.hval != self.config.hash(value) {
            return Err(VerifierError::OpeningMismatch {
                role,
                field: "value",
                opening: *opening,
            });
        }
        Ok(())
    }
}
