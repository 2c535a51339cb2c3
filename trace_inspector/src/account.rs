//! Values stored in the world-state tree.

use accumulator_trie::serializable::{i64_word, Serializable};
use ethereum_types::{H256, U256};
use serde::{Deserialize, Serialize};

/// An account, as committed in the world-state tree.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Transaction count.
    pub nonce: i64,
    /// Balance in wei.
    pub balance: U256,
    /// Top root of the account's storage trie.
    pub storage_root: H256,
    /// Hash of the code, with the field-native hash.
    pub code_hash_field_native: H256,
    /// Keccak hash of the code.
    pub keccak_code_hash: H256,
    /// Length of the code in bytes.
    pub code_size: i64,
}

/// Six 32-byte words, in field order.
impl Serializable for Account {
    fn write_canonical(&self, sink: &mut Vec<u8>) {
        sink.extend_from_slice(&i64_word(self.nonce));
        self.balance.write_canonical(sink);
        sink.extend_from_slice(self.storage_root.as_bytes());
        sink.extend_from_slice(self.code_hash_field_native.as_bytes());
        sink.extend_from_slice(self.keccak_code_hash.as_bytes());
        sink.extend_from_slice(&i64_word(self.code_size));
    }
}
