//! Records stored at the leaves of the accumulator.

use std::fmt::{self, Display};

use ethereum_types::H256;
use serde::{Deserialize, Serialize};

use crate::hashing::{Config, Digest};
use crate::serializable::{i64_word, Serializable};

/// List index (and tree position) of the head sentinel.
pub const HEAD_INDEX: i64 = 0;

/// List index (and tree position) of the tail sentinel.
pub const TAIL_INDEX: i64 = 1;

/// First tree position handed out to an application leaf.
pub const FIRST_FREE_NODE: i64 = 2;

/// Hashed key of the head sentinel, smaller than any other digest.
pub const HEAD_HKEY: Digest = H256([0; 32]);

/// Hashed key of the tail sentinel, larger than any other digest.
pub const TAIL_HKEY: Digest = H256([0xff; 32]);

/// Node of the sorted linked list, as committed in the tree.
///
/// `prev` and `next` are list indices, which are also tree positions.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct LeafOpening {
    /// Index of the leaf with the next-smaller hashed key.
    #[serde(rename = "prevLeaf")]
    pub prev: i64,
    /// Index of the leaf with the next-larger hashed key.
    #[serde(rename = "nextLeaf")]
    pub next: i64,
    /// Hash of the key.
    pub hkey: Digest,
    /// Hash of the value.
    pub hval: Digest,
}

impl LeafOpening {
    /// The head sentinel.
    pub const fn head() -> Self {
        Self {
            prev: HEAD_INDEX,
            next: TAIL_INDEX,
            hkey: HEAD_HKEY,
            hval: H256([0; 32]),
        }
    }

    /// The tail sentinel.
    pub const fn tail() -> Self {
        Self {
            prev: HEAD_INDEX,
            next: TAIL_INDEX,
            hkey: TAIL_HKEY,
            hval: H256([0; 32]),
        }
    }

    /// Digest committed in the tree for this leaf.
    pub fn hash(&self, config: &Config) -> Digest {
        config.hash(self)
    }
}

/// `prev || next || hkey || hval`, 128 bytes.
impl Serializable for LeafOpening {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        sink.extend_from_slice(&i64_word(self.prev));
        sink.extend_from_slice(&i64_word(self.next));
        sink.extend_from_slice(self.hkey.as_bytes());
        sink.extend_from_slice(self.hval.as_bytes());
    }
}

impl Display for LeafOpening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeafOpening{{Prev: {}, Next: {}, HKey: {:#x}, HVal: {:#x}}}",
            self.prev, self.next, self.hkey, self.hval
        )
    }
}

/// Everything the prover keeps about one occupied leaf.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyValueOpeningTuple<K, V> {
    /// The committed opening. Its `hkey`/`hval` are the hashes of `key`/`value`.
    pub leaf_opening: LeafOpening,
    /// Key in the clear.
    pub key: K,
    /// Value in the clear.
    pub value: V,
}
