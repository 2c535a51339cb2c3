//! Canonical byte encodings of the keys and values stored in the accumulator.

use ethereum_types::{Address, H256, U256};

/// Types that have a canonical byte encoding, hashed to obtain the `hkey` and
/// `hval` of a leaf.
pub trait Serializable {
    /// Appends the canonical encoding of `self` to `sink`.
    fn write_canonical(&self, sink: &mut Vec<u8>);

    /// Returns the canonical encoding of `self`.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_canonical(&mut buf);
        buf
    }
}

/// Encodes a signed integer as a 32-byte big-endian two's complement word.
pub fn i64_word(v: i64) -> [u8; 32] {
    let mut word = if v < 0 { [0xff; 32] } else { [0; 32] };
    word[24..].copy_from_slice(&v.to_be_bytes());
    word
}

impl Serializable for H256 {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        sink.extend_from_slice(self.as_bytes());
    }
}

/// Addresses are left-padded to a full 32-byte word.
impl Serializable for Address {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        sink.extend_from_slice(&[0; 12]);
        sink.extend_from_slice(self.as_bytes());
    }
}

impl Serializable for U256 {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        let mut word = [0; 32];
        self.to_big_endian(&mut word);
        sink.extend_from_slice(&word);
    }
}

impl Serializable for i64 {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        sink.extend_from_slice(&i64_word(*self));
    }
}
