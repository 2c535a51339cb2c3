//! Replay of the traces of a whole block.
//!
//! The traces of a block are split into account segments, each of which is
//! classified by the [`inspector`][crate::inspector]. Every trace is then
//! replayed: world-state traces through a single verifier carried across the
//! block, storage traces through one verifier per run of storage traces. Each
//! storage run is tied to the world-state trace of its sub-segment, whose
//! account values must carry the top root of the storage trie before and after
//! the run.

use accumulator_trie::{ProverError, Trace, VerifierError, VerifierState};
use ethereum_types::{Address, H256};
use log::{debug, info};
use thiserror::Error;

use crate::account::Account;
use crate::decoded_trace::{AnyTrace, DecodedTrace, StorageTrace, WireError, WorldStateTrace};
use crate::inspector::{inspect_account_segment, InspectError};
use crate::world_state::{storage_location, StateConfig, WORLD_STATE_LOCATION};

/// A block whose traces do not replay.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CheckError {
    /// The block has no world-state trace to start from.
    #[error("block has no world-state trace")]
    NoWorldStateTrace,

    /// A trace carries malformed metadata.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// An account segment is not legal.
    #[error("segment #{index} of account {account:#x}: {source}")]
    Segment {
        /// Index of the segment in the block.
        index: usize,
        /// Account of the segment.
        account: Address,
        /// What is wrong with it.
        #[source]
        source: InspectError,
    },

    /// A world-state trace was rejected.
    #[error("world-state trace at position {position}: {source}")]
    WorldState {
        /// Position of the trace in the block.
        position: usize,
        /// Why it was rejected.
        #[source]
        source: VerifierError,
    },

    /// A storage trace was rejected.
    #[error("storage trace of {account:#x} at position {position}: {source}")]
    Storage {
        /// Account owning the storage.
        account: Address,
        /// Position of the trace in the block.
        position: usize,
        /// Why it was rejected.
        #[source]
        source: VerifierError,
    },

    /// An account value does not carry the top root of its storage trie.
    #[error("account {account:#x} claims storage root {claimed:#x} but its storage is at {actual:#x}")]
    StorageRootMismatch {
        /// The account.
        account: Address,
        /// Storage root held by the account value.
        claimed: H256,
        /// Top root of the storage trie.
        actual: H256,
    },

    /// The empty storage trie could not be built.
    #[error(transparent)]
    Prover(#[from] ProverError),
}

/// Splits the traces of a block into maximal runs of consecutive traces
/// relating to the same account.
pub fn split_account_segments(
    traces: &[DecodedTrace],
) -> Result<Vec<&[DecodedTrace]>, WireError> {
    let accounts = traces
        .iter()
        .map(DecodedTrace::related_account)
        .collect::<Result<Vec<_>, _>>()?;

    let mut segments = Vec::new();
    let mut start = 0;
    for end in 1..=traces.len() {
        if end == traces.len() || accounts[end] != accounts[start] {
            segments.push(&traces[start..end]);
            start = end;
        }
    }
    Ok(segments)
}

/// A world-state trace and the storage run it closes (or opens, for a
/// read-only segment starting with its world-state read).
struct SubSegment<'a> {
    world_state: (usize, &'a WorldStateTrace),
    storage: Vec<(usize, &'a StorageTrace)>,
}

fn sub_segments(offset: usize, segment: &[DecodedTrace]) -> Vec<SubSegment<'_>> {
    let mut subs = Vec::new();
    let mut storage = Vec::new();
    for (i, trace) in segment.iter().enumerate() {
        match &trace.underlying {
            AnyTrace::Storage(t) => storage.push((offset + i, t)),
            AnyTrace::WorldState(t) => subs.push(SubSegment {
                world_state: (offset + i, t),
                storage: std::mem::take(&mut storage),
            }),
        }
    }
    // Storage reads after a leading world-state read.
    if let Some(last) = subs.last_mut() {
        last.storage.append(&mut storage);
    }
    subs
}

/// Account values before and after a world-state trace.
fn account_transition(trace: &WorldStateTrace) -> (Option<&Account>, Option<&Account>) {
    match trace {
        Trace::ReadZero(_) => (None, None),
        Trace::ReadNonZero(t) => (Some(&t.value), Some(&t.value)),
        Trace::Insertion(t) => (None, Some(&t.value)),
        Trace::Update(t) => (Some(&t.old_value), Some(&t.new_value)),
        Trace::Deletion(t) => (Some(&t.deleted_value), None),
    }
}

fn check_storage_root(account: Address, claimed: H256, actual: H256) -> Result<(), CheckError> {
    if claimed == actual {
        return Ok(());
    }
    Err(CheckError::StorageRootMismatch {
        account,
        claimed,
        actual,
    })
}

struct BlockChecker<'c> {
    config: &'c StateConfig,
    world_state: VerifierState<Address, Account>,
}

impl BlockChecker<'_> {
    fn check_sub_segment(
        &mut self,
        account: Address,
        sub: &SubSegment<'_>,
    ) -> Result<(), CheckError> {
        let (ws_position, ws_trace) = sub.world_state;
        let (before, after) = account_transition(ws_trace);

        // A storage trie only starts from scratch when its account is created.
        let mut storage = match (before, sub.storage.first()) {
            (None, None) if after.is_none() => {
                return self.replay_world_state(ws_position, ws_trace);
            }
            (None, _) => self.config.empty_storage_trie(&account)?.verifier_state(),
            (Some(_), Some((_, first))) => VerifierState::new(
                storage_location(&account),
                first.old_next_free_node(),
                first.old_sub_root(),
                self.config.storage,
            ),
            (Some(value), None) => {
                if let Some(after) = after {
                    check_storage_root(account, after.storage_root, value.storage_root)?;
                }
                return self.replay_world_state(ws_position, ws_trace);
            }
        };

        if let Some(before) = before {
            check_storage_root(account, before.storage_root, storage.top_root())?;
        }
        for (position, trace) in &sub.storage {
            storage
                .verify_trace(trace)
                .map_err(|source| CheckError::Storage {
                    account,
                    position: *position,
                    source,
                })?;
        }
        if let Some(after) = after {
            check_storage_root(account, after.storage_root, storage.top_root())?;
        }

        self.replay_world_state(ws_position, ws_trace)
    }

    fn replay_world_state(
        &mut self,
        position: usize,
        trace: &WorldStateTrace,
    ) -> Result<(), CheckError> {
        self.world_state
            .verify_trace(trace)
            .map_err(|source| CheckError::WorldState { position, source })
    }
}

/// Checks every trace of a block: segment patterns, storage ordering, proofs
/// and the storage roots carried by account values. Returns the top roots of
/// the world state before and after the block.
pub fn check_traces(
    config: &StateConfig,
    traces: &[DecodedTrace],
) -> Result<(H256, H256), CheckError> {
    let first_ws = traces
        .iter()
        .find_map(|trace| match &trace.underlying {
            AnyTrace::WorldState(t) => Some(t),
            AnyTrace::Storage(_) => None,
        })
        .ok_or(CheckError::NoWorldStateTrace)?;

    let mut checker = BlockChecker {
        config,
        world_state: VerifierState::new(
            WORLD_STATE_LOCATION,
            first_ws.old_next_free_node(),
            first_ws.old_sub_root(),
            config.world_state,
        ),
    };
    let old_root = checker.world_state.top_root();

    let mut offset = 0;
    for (index, segment) in split_account_segments(traces)?.into_iter().enumerate() {
        let account = segment[0].related_account()?;
        let pattern = inspect_account_segment(config, segment).map_err(|source| {
            CheckError::Segment {
                index,
                account,
                source,
            }
        })?;
        debug!("segment #{} of {:#x}: {}", index, account, pattern);

        for sub in sub_segments(offset, segment) {
            checker.check_sub_segment(account, &sub)?;
        }
        offset += segment.len();
    }

    let new_root = checker.world_state.top_root();
    info!(
        "checked {} traces: world state {:#x} -> {:#x}",
        traces.len(),
        old_root,
        new_root
    );
    Ok((old_root, new_root))
}
