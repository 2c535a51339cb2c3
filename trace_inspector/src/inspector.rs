//! Classification of the traces emitted for one account during one block.
//!
//! A segment is a run of consecutive traces relating to the same account. It
//! mixes storage traces with world-state traces and must follow one of the
//! shapes of [`AccountSegmentPattern`], tried in declaration order. Storage
//! traces are further required to come sorted, reads first, then by
//! increasing hashed key.

use std::fmt::{self, Display};

use accumulator_trie::{Digest, OperationKind};
use ethereum_types::Address;
use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::decoded_trace::{DecodedTrace, TraceKind, WireError};
use crate::world_state::StateConfig;

/// The legal shapes of an account segment.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AccountSegmentPattern {
    /// A lone world-state read-zero: the account does not exist.
    MissingAccount,
    /// Storage reads-zero and insertions, then a world-state insertion.
    Creation,
    /// Storage reads, then a world-state deletion.
    Deletion,
    /// Any storage traces, then a world-state update.
    ReadWrite,
    /// A world-state read-non-zero, first or last, and storage reads.
    ReadOnly,
    /// A deletion segment followed by a creation segment.
    Redeployment,
}

impl AccountSegmentPattern {
    const fn context(self) -> &'static str {
        match self {
            Self::MissingAccount => "missing-account segment",
            Self::Creation => "account-creation segment",
            Self::Deletion => "account-deletion segment",
            Self::ReadWrite => "read-write segment",
            Self::ReadOnly => "read-only segment",
            Self::Redeployment => "account-redeployment segment",
        }
    }
}

impl Display for AccountSegmentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.context())
    }
}

/// A pair of adjacent storage traces out of order.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum OrderingError {
    /// A storage read comes after a storage write.
    #[error("storage read at position {position} comes after a write")]
    ReadAfterWrite {
        /// Position of the read in the segment.
        position: usize,
    },

    /// Two storage traces of the same read/write kind are not sorted by
    /// strictly increasing hashed key.
    #[error("storage hkey {current:#x} at position {position} does not exceed the previous one {previous:#x}")]
    HKeyNotIncreasing {
        /// Position of the second trace in the segment.
        position: usize,
        /// Hashed key of the first trace.
        previous: Digest,
        /// Hashed key of the second trace.
        current: Digest,
    },
}

/// A segment that is not legal.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InspectError {
    /// No trace at all.
    #[error("empty account segment")]
    EmptySegment,

    /// The traces relate to more than one account.
    #[error("trace at position {position} relates to {other:#x}, not {first:#x}")]
    MixedAccounts {
        /// Account of the first trace.
        first: Address,
        /// Account of the offending trace.
        other: Address,
        /// Position of the offending trace.
        position: usize,
    },

    /// A trace carries malformed metadata.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The sequence of trace kinds fits no pattern.
    #[error("segment matches no pattern: [{}]", .kinds.iter().join(", "))]
    NoPatternMatched {
        /// Kinds of the traces, in order.
        kinds: Vec<TraceKind>,
    },

    /// Storage traces are out of order. Every offending pair is listed.
    #[error("storage traces out of order: {}", .0.iter().join("; "))]
    StorageOrdering(Vec<OrderingError>),

    /// The segment has the shape of a pattern but breaks one of its rules.
    #[error("in {pattern}: {source}")]
    InPattern {
        /// Pattern the segment was matched against.
        pattern: AccountSegmentPattern,
        /// What went wrong.
        #[source]
        source: Box<InspectError>,
    },
}

fn is_storage(kind: &TraceKind, allowed: &[OperationKind]) -> bool {
    !kind.world_state && allowed.contains(&kind.op)
}

const STORAGE_READS: &[OperationKind] = &[OperationKind::ReadZero, OperationKind::ReadNonZero];
const CREATION_STORAGE: &[OperationKind] = &[OperationKind::ReadZero, OperationKind::Insertion];
const ANY_STORAGE: &[OperationKind] = &[
    OperationKind::ReadZero,
    OperationKind::ReadNonZero,
    OperationKind::Insertion,
    OperationKind::Update,
    OperationKind::Deletion,
];

/// `kinds` is a run of allowed storage kinds closed by world-state `last`.
fn closed_by(kinds: &[TraceKind], allowed: &[OperationKind], last: OperationKind) -> bool {
    match kinds.split_last() {
        Some((tail, body)) => {
            *tail == TraceKind::world_state(last)
                && body.iter().all(|kind| is_storage(kind, allowed))
        }
        None => false,
    }
}

/// Position of the world-state read of a read-only segment, if the segment is
/// one.
fn read_only_position(kinds: &[TraceKind]) -> Option<usize> {
    let ws_read = TraceKind::world_state(OperationKind::ReadNonZero);
    let position = match (kinds.first(), kinds.last()) {
        (Some(first), _) if *first == ws_read => 0,
        (_, Some(last)) if *last == ws_read => kinds.len() - 1,
        _ => return None,
    };

    kinds
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .all(|(_, kind)| is_storage(kind, STORAGE_READS))
        .then_some(position)
}

/// Position of the world-state deletion splitting a redeployment segment, if
/// the segment is one.
fn redeployment_split(kinds: &[TraceKind]) -> Option<usize> {
    let ws_delete = TraceKind::world_state(OperationKind::Deletion);
    let split = kinds.iter().position(|kind| *kind == ws_delete)?;
    let (deletion, creation) = kinds.split_at(split + 1);
    (closed_by(deletion, STORAGE_READS, OperationKind::Deletion)
        && closed_by(creation, CREATION_STORAGE, OperationKind::Insertion))
    .then_some(split)
}

/// Matches the shape of a segment against the patterns, in order.
pub fn classify(kinds: &[TraceKind]) -> Option<AccountSegmentPattern> {
    use AccountSegmentPattern::*;

    if kinds == [TraceKind::world_state(OperationKind::ReadZero)] {
        Some(MissingAccount)
    } else if closed_by(kinds, CREATION_STORAGE, OperationKind::Insertion) {
        Some(Creation)
    } else if closed_by(kinds, STORAGE_READS, OperationKind::Deletion) {
        Some(Deletion)
    } else if closed_by(kinds, ANY_STORAGE, OperationKind::Update) {
        Some(ReadWrite)
    } else if read_only_position(kinds).is_some() {
        Some(ReadOnly)
    } else if redeployment_split(kinds).is_some() {
        Some(Redeployment)
    } else {
        None
    }
}

/// Checks that a run of storage traces is sorted by `(rw_flag, hkey)`,
/// strictly. Traces are given with their position in the segment, and every
/// offending adjacent pair is reported.
pub fn storage_ordering_errors<'a>(
    config: &StateConfig,
    run: impl IntoIterator<Item = (usize, &'a DecodedTrace)>,
) -> Vec<OrderingError> {
    run.into_iter()
        .map(|(position, trace)| (position, trace.rw_flag(), trace.hkey(config)))
        .tuple_windows()
        .filter_map(|((_, prev_rw, previous), (position, rw, current))| {
            if prev_rw > rw {
                Some(OrderingError::ReadAfterWrite { position })
            } else if prev_rw == rw && previous >= current {
                Some(OrderingError::HKeyNotIncreasing {
                    position,
                    previous,
                    current,
                })
            } else {
                None
            }
        })
        .collect()
}

fn check_ordering<'a>(
    config: &StateConfig,
    runs: impl IntoIterator<Item = &'a [DecodedTrace]>,
    offsets: impl IntoIterator<Item = usize>,
) -> Result<(), InspectError> {
    let errors = runs
        .into_iter()
        .zip(offsets)
        .flat_map(|(run, offset)| {
            storage_ordering_errors(config, run.iter().enumerate().map(|(i, t)| (offset + i, t)))
        })
        .collect::<Vec<_>>();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(InspectError::StorageOrdering(errors))
    }
}

/// Account every trace of `segment` relates to.
pub fn segment_account(segment: &[DecodedTrace]) -> Result<Address, InspectError> {
    let (head, rest) = segment.split_first().ok_or(InspectError::EmptySegment)?;
    let first = head.related_account()?;
    for (i, trace) in rest.iter().enumerate() {
        let other = trace.related_account()?;
        if other != first {
            return Err(InspectError::MixedAccounts {
                first,
                other,
                position: i + 1,
            });
        }
    }
    Ok(first)
}

/// Classifies `segment` and checks the ordering of its storage traces.
pub fn inspect_account_segment(
    config: &StateConfig,
    segment: &[DecodedTrace],
) -> Result<AccountSegmentPattern, InspectError> {
    segment_account(segment)?;
    let kinds = segment.iter().map(DecodedTrace::kind).collect::<Vec<_>>();
    let pattern = classify(&kinds).ok_or_else(|| InspectError::NoPatternMatched {
        kinds: kinds.clone(),
    })?;
    debug!("segment [{}] is a {}", kinds.iter().join(", "), pattern);

    let last = segment.len() - 1;
    let ordered = match pattern {
        AccountSegmentPattern::MissingAccount => Ok(()),
        AccountSegmentPattern::Creation
        | AccountSegmentPattern::Deletion
        | AccountSegmentPattern::ReadWrite => check_ordering(config, [&segment[..last]], [0]),
        AccountSegmentPattern::ReadOnly => {
            // The world-state read is moved to the end, leaving the storage
            // reads in place.
            match read_only_position(&kinds) {
                Some(0) => check_ordering(config, [&segment[1..]], [1]),
                _ => check_ordering(config, [&segment[..last]], [0]),
            }
        }
        AccountSegmentPattern::Redeployment => {
            let split = redeployment_split(&kinds).unwrap_or(last);
            check_ordering(
                config,
                [&segment[..split], &segment[split + 1..last]],
                [0, split + 1],
            )
        }
    };

    ordered.map_err(|source| InspectError::InPattern {
        pattern,
        source: Box::new(source),
    })?;
    Ok(pattern)
}
