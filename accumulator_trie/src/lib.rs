//! An authenticated key/value accumulator with proofs of absence.
//!
//! Keys are kept in a doubly-linked list sorted by hashed key, and every list
//! node is a leaf of a fixed-depth sparse Merkle tree. Two sentinel leaves
//! (at positions `0` and `1`) bracket the list, so every absent key falls
//! between two adjacent leaves whose openings prove the absence.
//!
//! The [`ProverState`][prover::ProverState] holds the full tree and emits a
//! [`Trace`][trace::Trace] for every operation. The
//! [`VerifierState`][verifier::VerifierState] only tracks the root and the
//! free-node counter of a tree, and advances them by replaying traces.
//!
//! Hashing is never hard-coded: every component is handed a
//! [`Config`][hashing::Config].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod hashing;
pub mod leaf_opening;
pub mod merkle;
pub mod prover;
pub mod serializable;
pub mod trace;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing_utils;

pub use hashing::{Config, Digest, Hasher};
pub use leaf_opening::{KeyValueOpeningTuple, LeafOpening};
pub use merkle::{MerkleClaim, MerkleTree, Proof};
pub use prover::{ProverError, ProverState};
pub use serializable::Serializable;
pub use trace::{OperationKind, Trace};
pub use verifier::{VerifierError, VerifierState};
