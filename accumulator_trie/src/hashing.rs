//! Hash functions injected into the accumulator.
//!
//! The accumulator never hard-codes its hash function. Every tree, prover and
//! verifier carries a [`Config`] whose `hash_func` builds a fresh streaming
//! [`Hasher`]. Two instantiations are provided:
//! - [`KeccakHasher`], used for the world-state (account) tree.
//! - [`PoseidonHasher`], a field-native hash over the Goldilocks field, used
//!   for the storage tries.

use ethereum_types::H256;
use plonky2::field::goldilocks_field::GoldilocksField;
use plonky2::field::types::{Field, PrimeField64};
use plonky2::hash::poseidon::PoseidonHash;
use plonky2::plonk::config::Hasher as PlonkyHasher;

use crate::serializable::{i64_word, Serializable};

/// A 32-byte digest. Ordering is byte-wise, which is what the sorted list
/// relies on.
pub type Digest = H256;

/// Depth of the trees in the reference deployment.
pub const DEFAULT_DEPTH: usize = 40;

type F = GoldilocksField;

/// Streaming 2-to-1 / variable-arity compression function with a 32-byte
/// output.
pub trait Hasher {
    /// Absorbs `bytes`.
    fn write(&mut self, bytes: &[u8]);

    /// Returns the digest of everything written so far.
    fn sum(&self) -> Digest;
}

/// Hash configuration threaded through every tree, prover and verifier.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Builds a fresh hasher.
    pub hash_func: fn() -> Box<dyn Hasher>,
    /// Depth of the Merkle tree. The tree has `2^depth` leaves.
    pub depth: usize,
}

impl Config {
    /// Keccak-based configuration at [`DEFAULT_DEPTH`].
    pub fn keccak() -> Self {
        Self {
            hash_func: KeccakHasher::boxed,
            depth: DEFAULT_DEPTH,
        }
    }

    /// Poseidon-based configuration at [`DEFAULT_DEPTH`].
    pub fn poseidon() -> Self {
        Self {
            hash_func: PoseidonHasher::boxed,
            depth: DEFAULT_DEPTH,
        }
    }

    /// Same hash function, different tree depth.
    pub const fn with_depth(self, depth: usize) -> Self {
        Self {
            hash_func: self.hash_func,
            depth,
        }
    }

    /// Returns a fresh hasher.
    pub fn hasher(&self) -> Box<dyn Hasher> {
        (self.hash_func)()
    }

    /// Hashes raw bytes.
    pub fn hash_bytes(&self, bytes: &[u8]) -> Digest {
        let mut hasher = self.hasher();
        hasher.write(bytes);
        hasher.sum()
    }

    /// Hashes the canonical encoding of `value`.
    pub fn hash<T: Serializable + ?Sized>(&self, value: &T) -> Digest {
        self.hash_bytes(&value.canonical_bytes())
    }

    /// Compresses two sibling nodes into their parent.
    pub fn compress(&self, left: &Digest, right: &Digest) -> Digest {
        let mut hasher = self.hasher();
        hasher.write(left.as_bytes());
        hasher.write(right.as_bytes());
        hasher.sum()
    }

    /// Binds the free-node counter to the tree root:
    /// `Hash(next_free_node as 32-byte BE || sub_tree_root)`.
    pub fn top_root(&self, next_free_node: i64, sub_tree_root: &Digest) -> Digest {
        let mut hasher = self.hasher();
        hasher.write(&i64_word(next_free_node));
        hasher.write(sub_tree_root.as_bytes());
        hasher.sum()
    }
}

/// Keccak-256 over the concatenation of everything written.
#[derive(Clone, Debug, Default)]
pub struct KeccakHasher {
    buf: Vec<u8>,
}

impl KeccakHasher {
    /// Constructor usable as a [`Config::hash_func`].
    pub fn boxed() -> Box<dyn Hasher> {
        Box::<Self>::default()
    }
}

impl Hasher for KeccakHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn sum(&self) -> Digest {
        keccak_hash::keccak(&self.buf)
    }
}

/// Poseidon over the Goldilocks field.
///
/// The input is split into big-endian 32-bit limbs (the last one right-padded
/// with zeroes), each limb being a canonical field element. The four output
/// elements are written as big-endian `u64`s.
#[derive(Clone, Debug, Default)]
pub struct PoseidonHasher {
    buf: Vec<u8>,
}

impl PoseidonHasher {
    /// Constructor usable as a [`Config::hash_func`].
    pub fn boxed() -> Box<dyn Hasher> {
        Box::<Self>::default()
    }
}

impl Hasher for PoseidonHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn sum(&self) -> Digest {
        let limbs = self
            .buf
            .chunks(4)
            .map(|chunk| {
                let mut limb = [0u8; 4];
                limb[..chunk.len()].copy_from_slice(chunk);
                F::from_canonical_u32(u32::from_be_bytes(limb))
            })
            .collect::<Vec<_>>();
        let out = <PoseidonHash as PlonkyHasher<F>>::hash_no_pad(&limbs);

        let mut digest = [0u8; 32];
        for (chunk, element) in digest.chunks_exact_mut(8).zip(out.elements) {
            chunk.copy_from_slice(&element.to_canonical_u64().to_be_bytes());
        }
        H256(digest)
    }
}
