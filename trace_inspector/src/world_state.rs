//! The account tree and the storage tries hanging off it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use accumulator_trie::{Config, ProverError, ProverState};
use ethereum_types::{Address, H256};

use crate::account::Account;

/// Location of the world-state (account) tree.
pub const WORLD_STATE_LOCATION: &str = "0x";

/// Prover state of the account tree.
pub type AccountTrie = ProverState<Address, Account>;

/// Prover state of one account's storage.
pub type StorageTrie = ProverState<H256, H256>;

/// Location of the storage trie of `address`: its `0x`-prefixed hex form.
pub fn storage_location(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Hash configurations of the two kinds of tree.
#[derive(Clone, Copy, Debug)]
pub struct StateConfig {
    /// Configuration of the account tree.
    pub world_state: Config,
    /// Configuration of every storage trie.
    pub storage: Config,
}

impl Default for StateConfig {
    /// Keccak for accounts and Poseidon for storage, both at the default depth.
    fn default() -> Self {
        Self {
            world_state: Config::keccak(),
            storage: Config::poseidon(),
        }
    }
}

impl StateConfig {
    /// Same hash functions, with the given depths.
    pub const fn with_depths(self, world_state: usize, storage: usize) -> Self {
        Self {
            world_state: self.world_state.with_depth(world_state),
            storage: self.storage.with_depth(storage),
        }
    }

    /// A storage trie holding no slot.
    pub fn empty_storage_trie(&self, address: &Address) -> Result<StorageTrie, ProverError> {
        StorageTrie::new(self.storage, storage_location(address))
    }
}

/// Full state: the account tree and one storage trie per account.
#[derive(Debug)]
pub struct WorldState {
    /// Tree of accounts, keyed by address.
    pub account_trie: AccountTrie,
    /// Storage tries, keyed by the address of their account.
    pub storage_tries: HashMap<Address, StorageTrie>,
    /// Hash configurations in use.
    pub config: StateConfig,
}

impl WorldState {
    /// A state with no account.
    pub fn new(config: StateConfig) -> Result<Self, ProverError> {
        Ok(Self {
            account_trie: AccountTrie::new(config.world_state, WORLD_STATE_LOCATION)?,
            storage_tries: HashMap::new(),
            config,
        })
    }

    /// The account at `address`, if it exists.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.account_trie.get(address)
    }

    /// The storage trie of `address`, if one was created.
    pub fn storage_trie(&self, address: &Address) -> Option<&StorageTrie> {
        self.storage_tries.get(address)
    }

    /// Mutable access to the storage trie of `address`.
    pub fn storage_trie_mut(&mut self, address: &Address) -> Option<&mut StorageTrie> {
        self.storage_tries.get_mut(address)
    }

    /// Starts an empty storage trie for `address`, dropping any previous one.
    pub fn new_storage_trie(&mut self, address: Address) -> Result<&mut StorageTrie, ProverError> {
        let trie = self.config.empty_storage_trie(&address)?;
        Ok(match self.storage_tries.entry(address) {
            Entry::Occupied(mut slot) => {
                slot.insert(trie);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(trie),
        })
    }

    /// Drops the storage trie of `address`, returning it.
    pub fn remove_storage_trie(&mut self, address: &Address) -> Option<StorageTrie> {
        self.storage_tries.remove(address)
    }

    /// Top root of the storage trie of `address`, or of an empty trie if the
    /// account has none.
    pub fn storage_top_root(&self, address: &Address) -> Result<H256, ProverError> {
        match self.storage_trie(address) {
            Some(trie) => Ok(trie.top_root()),
            None => Ok(self.config.empty_storage_trie(address)?.top_root()),
        }
    }

    /// Top root of the account tree.
    pub fn top_root(&self) -> H256 {
        self.account_trie.top_root()
    }
}
