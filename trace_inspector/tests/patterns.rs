mod common;

use accumulator_trie::OperationKind;
use common::{account, address, common_setup, config, slot, World};
use trace_inspector::{
    inspect_account_segment, AccountSegmentPattern, DecodedTrace, InspectError, OrderingError,
    TraceKind,
};

type Inspected = Result<AccountSegmentPattern, InspectError>;

fn inspect(segment: &[DecodedTrace]) -> Inspected {
    inspect_account_segment(&config(), segment)
}

/// Unwraps the ordering errors found within a pattern.
fn ordering_errors(result: Inspected) -> (AccountSegmentPattern, Vec<OrderingError>) {
    match result {
        Err(InspectError::InPattern { pattern, source }) => match *source {
            InspectError::StorageOrdering(errors) => (pattern, errors),
            other => panic!("expected an ordering error, got {other}"),
        },
        other => panic!("expected a pattern error, got {other:?}"),
    }
}

#[test]
fn reading_a_missing_account() {
    common_setup();
    let world = World::new();
    let segment = world.read_missing(address(1));
    assert_eq!(inspect(&segment), Ok(AccountSegmentPattern::MissingAccount));
}

#[test]
fn creating_an_account() {
    common_setup();
    let mut world = World::new();
    let bare = world.create(address(1), account(10), &[], &[]);
    assert_eq!(bare.len(), 1);
    assert_eq!(inspect(&bare), Ok(AccountSegmentPattern::Creation));

    let with_storage = world.create(address(2), account(20), &[slot(1)], &[(slot(2), slot(7))]);
    let kinds = with_storage.iter().map(DecodedTrace::kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        [
            TraceKind::storage(OperationKind::ReadZero),
            TraceKind::storage(OperationKind::Insertion),
            TraceKind::world_state(OperationKind::Insertion),
        ]
    );
    assert_eq!(inspect(&with_storage), Ok(AccountSegmentPattern::Creation));
}

#[test]
fn reading_an_account() {
    common_setup();
    let mut world = World::new();
    let slots = [slot(3), slot(5), slot(8)];
    let writes = slots.map(|s| (s, s));
    world.create(address(1), account(10), &[], &writes);

    for ws_first in [false, true] {
        let segment = world.read_only(address(1), &[slot(3), slot(5), slot(9)], ws_first);
        assert_eq!(segment.len(), 4);
        assert_eq!(inspect(&segment), Ok(AccountSegmentPattern::ReadOnly));
    }
}

#[test]
fn descending_reads_are_rejected() {
    common_setup();
    let mut world = World::new();
    world.create(address(1), account(10), &[], &[(slot(3), slot(1)), (slot(5), slot(2))]);

    let mut segment = world.read_only(address(1), &[slot(3), slot(5)], false);
    segment.swap(0, 1);
    let (pattern, errors) = ordering_errors(inspect(&segment));
    assert_eq!(pattern, AccountSegmentPattern::ReadOnly);

    let sorted = world.sort_slots(&[slot(3), slot(5)]);
    let storage = config().storage;
    assert_eq!(
        errors,
        [OrderingError::HKeyNotIncreasing {
            position: 1,
            previous: storage.hash(&sorted[1]),
            current: storage.hash(&sorted[0]),
        }]
    );
}

#[test]
fn positions_account_for_a_leading_read() {
    common_setup();
    let mut world = World::new();
    world.create(address(1), account(10), &[], &[(slot(3), slot(1)), (slot(5), slot(2))]);

    let mut segment = world.read_only(address(1), &[slot(3), slot(5)], true);
    segment.swap(1, 2);
    let (_, errors) = ordering_errors(inspect(&segment));
    assert!(matches!(
        errors[..],
        [OrderingError::HKeyNotIncreasing { position: 2, .. }]
    ));
}

#[test]
fn every_ordering_violation_is_reported() {
    common_setup();
    let mut world = World::new();
    let writes = [(slot(2), slot(1)), (slot(3), slot(1)), (slot(4), slot(1))];
    let mut segment = world.create(address(1), account(10), &[slot(1)], &writes);
    segment[..4].reverse();

    let (pattern, errors) = ordering_errors(inspect(&segment));
    assert_eq!(pattern, AccountSegmentPattern::Creation);
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        errors[..],
        [
            OrderingError::HKeyNotIncreasing { position: 1, .. },
            OrderingError::HKeyNotIncreasing { position: 2, .. },
            OrderingError::ReadAfterWrite { position: 3 },
        ]
    ));
}

#[test]
fn writing_and_deleting_an_account() {
    common_setup();
    let mut world = World::new();
    world.create(address(1), account(10), &[], &[(slot(1), slot(1)), (slot(2), slot(2))]);

    let writes = [
        (slot(1), Some(slot(9))),
        (slot(2), None),
        (slot(3), Some(slot(3))),
    ];
    let update = world.update(address(1), &[slot(4)], &writes, 11);
    assert_eq!(inspect(&update), Ok(AccountSegmentPattern::ReadWrite));

    let bare_update = world.update(address(1), &[], &[], 12);
    assert_eq!(inspect(&bare_update), Ok(AccountSegmentPattern::ReadWrite));

    let deletion = world.delete(address(1), &[slot(1), slot(2)]);
    assert_eq!(inspect(&deletion), Ok(AccountSegmentPattern::Deletion));
}

#[test]
fn redeploying_an_account() {
    common_setup();
    let mut world = World::new();
    world.create(address(1), account(10), &[], &[(slot(1), slot(1))]);

    let mut segment = world.delete(address(1), &[]);
    segment.extend(world.create(address(1), account(0), &[slot(2)], &[]));
    let kinds = segment.iter().map(DecodedTrace::kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        [
            TraceKind::world_state(OperationKind::Deletion),
            TraceKind::storage(OperationKind::ReadZero),
            TraceKind::world_state(OperationKind::Insertion),
        ]
    );
    assert_eq!(inspect(&segment), Ok(AccountSegmentPattern::Redeployment));
}

#[test]
fn redeployment_halves_are_ordered_separately() {
    common_setup();
    let mut world = World::new();
    world.create(address(1), account(10), &[], &[(slot(1), slot(1))]);

    let mut segment = world.delete(address(1), &[]);
    segment.extend(world.create(address(1), account(0), &[slot(2)], &[(slot(3), slot(3))]));
    segment.swap(1, 2);

    let (pattern, errors) = ordering_errors(inspect(&segment));
    assert_eq!(pattern, AccountSegmentPattern::Redeployment);
    assert_eq!(errors, [OrderingError::ReadAfterWrite { position: 2 }]);
}

#[test]
fn segments_are_about_one_account() {
    common_setup();
    let world = World::new();
    let mut segment = world.read_missing(address(1));
    segment.extend(world.read_missing(address(2)));

    assert_eq!(
        inspect(&segment),
        Err(InspectError::MixedAccounts {
            first: address(1),
            other: address(2),
            position: 1,
        })
    );
    assert_eq!(inspect(&[]), Err(InspectError::EmptySegment));
}

#[test]
fn storage_alone_matches_nothing() {
    common_setup();
    let mut world = World::new();
    let segment = world.create(address(1), account(10), &[slot(1)], &[]);

    let err = inspect(&segment[..1]).unwrap_err();
    assert_eq!(
        err,
        InspectError::NoPatternMatched {
            kinds: vec![TraceKind::storage(OperationKind::ReadZero)],
        }
    );
    assert_eq!(err.to_string(), "segment matches no pattern: [ReadZeroST]");
}
