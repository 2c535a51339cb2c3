mod common;

use accumulator_trie::{Trace, VerifierError};
use common::{account, address, common_setup, config, slot, World};
use ethereum_types::H256;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use trace_inspector::{
    check_traces, split_account_segments, Account, AnyTrace, CheckError, DecodedTrace,
};

/// A world with a few accounts, created outside of any checked block.
fn populated_world() -> World {
    let mut world = World::new();
    for i in 1..=5 {
        let writes = (0..i).map(|j| (slot(j), slot(100 + j))).collect::<Vec<_>>();
        world.create(address(i), account(i * 10), &[], &writes);
    }
    world
}

/// One segment of each pattern.
fn mixed_block(world: &mut World) -> Vec<DecodedTrace> {
    let mut block = world.read_missing(address(9));
    block.extend(world.create(address(10), account(1), &[slot(1)], &[(slot(2), slot(2))]));
    block.extend(world.update(
        address(2),
        &[slot(7)],
        &[(slot(0), Some(slot(5))), (slot(1), None), (slot(6), Some(slot(6)))],
        21,
    ));
    block.extend(world.read_only(address(3), &[slot(0), slot(2), slot(8)], true));
    block.extend(world.read_only(address(5), &[slot(4)], false));
    block.extend(world.delete(address(4), &[slot(0), slot(3)]));
    block.extend(world.delete(address(1), &[]));
    block.extend(world.create(address(1), account(0), &[slot(0)], &[(slot(0), slot(1))]));
    block
}

#[test]
fn every_pattern_replays() {
    common_setup();
    let mut world = populated_world();
    let old_root = world.state.top_root();

    let block = mixed_block(&mut world);
    assert_eq!(split_account_segments(&block).unwrap().len(), 7);
    assert_eq!(
        check_traces(&config(), &block),
        Ok((old_root, world.state.top_root()))
    );
}

#[test]
fn blocks_survive_the_wire() {
    common_setup();
    let mut world = populated_world();
    let block = mixed_block(&mut world);

    let json = serde_json::to_string(&block).unwrap();
    let decoded = serde_json::from_str::<Vec<DecodedTrace>>(&json).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(
        check_traces(&config(), &decoded),
        check_traces(&config(), &block)
    );
}

#[test]
fn consecutive_blocks_chain() {
    common_setup();
    let mut world = World::new();
    let first = world.create(address(1), account(1), &[], &[(slot(1), slot(1))]);
    let second = world.update(address(1), &[], &[(slot(2), Some(slot(2)))], 2);

    let (_, end_of_first) = check_traces(&config(), &first).unwrap();
    let (start_of_second, end_of_second) = check_traces(&config(), &second).unwrap();
    assert_eq!(end_of_first, start_of_second);
    assert_eq!(end_of_second, world.state.top_root());
}

#[test]
fn unbound_storage_roots_are_rejected() {
    common_setup();
    let mut world = World::new();
    let claimed = H256::repeat_byte(9);
    let block = world.create_raw(
        address(1),
        Account {
            storage_root: claimed,
            ..account(1)
        },
        &[],
        &[(slot(1), slot(1))],
        false,
    );

    assert_eq!(
        check_traces(&config(), &block),
        Err(CheckError::StorageRootMismatch {
            account: address(1),
            claimed,
            actual: world.state.storage_top_root(&address(1)).unwrap(),
        })
    );
}

#[test]
fn missing_traces_break_the_chain() {
    common_setup();
    let mut world = World::new();
    let mut block = Vec::new();
    for i in 1..=3 {
        block.extend(world.create(address(i), account(i), &[], &[]));
    }
    block.remove(1);

    assert!(matches!(
        check_traces(&config(), &block),
        Err(CheckError::WorldState {
            position: 1,
            source: VerifierError::RootMismatch { .. },
        })
    ));
}

#[test]
fn tampered_storage_values_are_rejected() {
    common_setup();
    let mut world = populated_world();
    let mut block = world.update(address(3), &[], &[(slot(1), Some(slot(42)))], 30);

    let AnyTrace::Storage(Trace::Update(trace)) = &mut block[0].underlying else {
        panic!("expected a storage update first");
    };
    trace.new_value = slot(43);

    assert!(matches!(
        check_traces(&config(), &block),
        Err(CheckError::Storage { position: 0, .. })
    ));
}

#[test]
fn ordering_is_enforced_by_the_checker() {
    common_setup();
    let mut world = populated_world();
    let mut block = world.read_only(address(5), &[slot(1), slot(2)], false);
    block.swap(0, 1);

    assert!(matches!(
        check_traces(&config(), &block),
        Err(CheckError::Segment { index: 0, .. })
    ));
}

#[test]
fn exhausted_counters_fail_cleanly() {
    common_setup();
    let mut world = World::new();
    let mut block = world.read_missing(address(9));
    block.extend(world.create(address(1), account(1), &[], &[]));

    let AnyTrace::WorldState(Trace::ReadZero(read)) = &mut block[0].underlying else {
        panic!("expected a world state read first");
    };
    read.next_free_node = i64::MAX;
    let AnyTrace::WorldState(Trace::Insertion(insertion)) = &mut block[1].underlying else {
        panic!("expected a world state insertion last");
    };
    insertion.proof_new.path = i64::MAX;

    assert!(matches!(
        check_traces(&config(), &block),
        Err(CheckError::WorldState {
            position: 1,
            source: VerifierError::NextFreeNodeMismatch {
                expected: i64::MAX,
                ..
            },
        })
    ));
}

#[test]
fn blocks_need_a_world_state_trace() {
    common_setup();
    let mut world = World::new();
    let segment = world.create(address(1), account(1), &[slot(1)], &[]);

    assert_eq!(
        check_traces(&config(), &segment[..1]),
        Err(CheckError::NoWorldStateTrace)
    );
}

/// Random segments over a handful of accounts, each account touched at most
/// once per block.
fn random_block(world: &mut World, rng: &mut StdRng) -> Vec<DecodedTrace> {
    let mut addresses = (1..=8).map(address).collect::<Vec<_>>();
    addresses.shuffle(rng);
    let touched = rng.gen_range(1..=addresses.len());

    let mut block = Vec::new();
    for address in addresses.into_iter().take(touched) {
        let mut slots = (0..16).map(slot).collect::<Vec<_>>();
        slots.shuffle(rng);
        slots.truncate(rng.gen_range(0..6));

        let Some(trie) = world.state.storage_trie(&address) else {
            if rng.gen_bool(0.2) {
                block.extend(world.read_missing(address));
            } else {
                let (reads, writes) = slots.split_at(slots.len() / 2);
                let writes = writes.iter().map(|s| (*s, H256(rng.gen()))).collect::<Vec<_>>();
                block.extend(world.create(address, account(rng.gen()), reads, &writes));
            }
            continue;
        };

        let mut reads = Vec::new();
        let mut writes = Vec::new();
        for s in slots {
            match (trie.get(&s).is_some(), rng.gen_range(0..3)) {
                (_, 0) => reads.push(s),
                (true, 1) => writes.push((s, None)),
                _ => writes.push((s, Some(H256(rng.gen())))),
            }
        }

        match rng.gen_range(0..10) {
            0 => block.extend(world.delete(address, &reads)),
            1 => {
                block.extend(world.delete(address, &reads));
                block.extend(world.create(address, account(0), &[], &[]));
            }
            2 | 3 => block.extend(world.read_only(address, &reads, rng.gen())),
            _ => block.extend(world.update(address, &reads, &writes, rng.gen())),
        }
    }
    block
}

#[test]
fn random_blocks_replay() {
    common_setup();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut world = World::new();

    let mut previous = world.state.top_root();
    for _ in 0..20 {
        let block = random_block(&mut world, &mut rng);
        let (old_root, new_root) = check_traces(&config(), &block).unwrap();
        assert_eq!(old_root, previous);
        assert_eq!(new_root, world.state.top_root());
        previous = new_root;
    }
}
