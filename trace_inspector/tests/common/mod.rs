//! Builds well-formed account segments by running operations on a real
//! [`WorldState`].

#![allow(dead_code)]

use ethereum_types::{Address, H256, U256};
use trace_inspector::{Account, DecodedTrace, StateConfig, WorldState};

pub fn common_setup() {
    let _ = pretty_env_logger::try_init();
}

pub fn config() -> StateConfig {
    StateConfig::default().with_depths(12, 12)
}

pub fn address(i: u64) -> Address {
    Address::from_low_u64_be(i)
}

pub fn slot(i: u64) -> H256 {
    H256::from_low_u64_be(i)
}

pub fn account(balance: u64) -> Account {
    Account {
        nonce: 1,
        balance: U256::from(balance),
        keccak_code_hash: keccak_hash::KECCAK_EMPTY,
        ..Default::default()
    }
}

pub struct World {
    pub state: WorldState,
}

impl World {
    pub fn new() -> Self {
        Self {
            state: WorldState::new(config()).unwrap(),
        }
    }

    fn sorted_by_hkey<T: Copy>(&self, items: &[T], key: impl Fn(&T) -> H256) -> Vec<T> {
        let mut items = items.to_vec();
        let storage = self.state.config.storage;
        items.sort_by_key(|item| storage.hash(&key(item)));
        items
    }

    /// Slots sorted by increasing hashed key.
    pub fn sort_slots(&self, slots: &[H256]) -> Vec<H256> {
        self.sorted_by_hkey(slots, |s| *s)
    }

    fn storage_reads(&self, address: Address, slots: &[H256]) -> Vec<DecodedTrace> {
        let Some(trie) = self.state.storage_trie(&address) else {
            return Vec::new();
        };
        self.sort_slots(slots)
            .iter()
            .map(|slot| match trie.get(slot) {
                Some(_) => DecodedTrace::storage(trie.read_non_zero_and_prove(slot).unwrap()),
                None => DecodedTrace::storage(trie.read_zero_and_prove(slot).unwrap()),
            })
            .collect()
    }

    /// Writes of `None` delete the slot.
    fn storage_writes(
        &mut self,
        address: Address,
        writes: &[(H256, Option<H256>)],
    ) -> Vec<DecodedTrace> {
        let writes = self.sorted_by_hkey(writes, |(s, _)| *s);
        let trie = self.state.storage_trie_mut(&address).unwrap();
        writes
            .into_iter()
            .map(|(slot, value)| match (trie.get(&slot).is_some(), value) {
                (false, Some(value)) => {
                    DecodedTrace::storage(trie.insert_and_prove(slot, value).unwrap())
                }
                (true, Some(value)) => {
                    DecodedTrace::storage(trie.update_and_prove(&slot, value).unwrap())
                }
                (true, None) => DecodedTrace::storage(trie.delete_and_prove(&slot).unwrap()),
                (false, None) => DecodedTrace::storage(trie.read_zero_and_prove(&slot).unwrap()),
            })
            .collect()
    }

    pub fn read_missing(&self, address: Address) -> Vec<DecodedTrace> {
        vec![DecodedTrace::world_state(
            self.state
                .account_trie
                .read_zero_and_prove(&address)
                .unwrap(),
        )]
    }

    /// Creates an account with the given storage. When `bind_storage` is
    /// false, the account keeps whatever storage root it was given.
    pub fn create_raw(
        &mut self,
        address: Address,
        mut value: Account,
        zero_reads: &[H256],
        writes: &[(H256, H256)],
        bind_storage: bool,
    ) -> Vec<DecodedTrace> {
        self.state.new_storage_trie(address).unwrap();
        let mut segment = self.storage_reads(address, zero_reads);
        let writes = writes.iter().map(|(s, v)| (*s, Some(*v))).collect::<Vec<_>>();
        segment.extend(self.storage_writes(address, &writes));

        if bind_storage {
            value.storage_root = self.state.storage_top_root(&address).unwrap();
        }
        segment.push(DecodedTrace::world_state(
            self.state
                .account_trie
                .insert_and_prove(address, value)
                .unwrap(),
        ));
        segment
    }

    pub fn create(
        &mut self,
        address: Address,
        value: Account,
        zero_reads: &[H256],
        writes: &[(H256, H256)],
    ) -> Vec<DecodedTrace> {
        self.create_raw(address, value, zero_reads, writes, true)
    }

    pub fn read_only(
        &self,
        address: Address,
        reads: &[H256],
        ws_first: bool,
    ) -> Vec<DecodedTrace> {
        let ws = DecodedTrace::world_state(
            self.state
                .account_trie
                .read_non_zero_and_prove(&address)
                .unwrap(),
        );
        let mut segment = self.storage_reads(address, reads);
        if ws_first {
            segment.insert(0, ws);
        } else {
            segment.push(ws);
        }
        segment
    }

    pub fn update(
        &mut self,
        address: Address,
        reads: &[H256],
        writes: &[(H256, Option<H256>)],
        balance: u64,
    ) -> Vec<DecodedTrace> {
        let mut segment = self.storage_reads(address, reads);
        segment.extend(self.storage_writes(address, writes));

        let value = Account {
            balance: U256::from(balance),
            storage_root: self.state.storage_top_root(&address).unwrap(),
            ..*self.state.account(&address).unwrap()
        };
        segment.push(DecodedTrace::world_state(
            self.state
                .account_trie
                .update_and_prove(&address, value)
                .unwrap(),
        ));
        segment
    }

    pub fn delete(&mut self, address: Address, reads: &[H256]) -> Vec<DecodedTrace> {
        let mut segment = self.storage_reads(address, reads);
        segment.push(DecodedTrace::world_state(
            self.state.account_trie.delete_and_prove(&address).unwrap(),
        ));
        self.state.remove_storage_trie(&address);
        segment
    }
}
