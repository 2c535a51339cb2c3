//! Audit of the accumulator traces emitted for a block.
//!
//! A block touches the world-state tree (accounts, keyed by address) and the
//! storage tries of some accounts. The traces it emits are grouped into
//! account segments, one per run of consecutive traces about the same
//! account. This crate:
//! - decodes traces of both kinds of tree ([`decoded_trace`]),
//! - classifies each segment as one of the legal account lifecycles and checks
//!   the ordering of its storage traces ([`inspector`]),
//! - replays a whole block through verifiers and returns the world-state roots
//!   it moves between ([`checker`]).
//!
//! The [`world_state`] module holds the prover side: the account tree and the
//! storage tries.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]

pub mod account;
pub mod checker;
pub mod decoded_trace;
pub mod inspector;
pub mod tracing;
pub mod world_state;

pub use account::Account;
pub use checker::{check_traces, split_account_segments, CheckError};
pub use decoded_trace::{AnyTrace, DecodedTrace, TraceKind, WireError};
pub use inspector::{inspect_account_segment, AccountSegmentPattern, InspectError, OrderingError};
pub use world_state::{StateConfig, WorldState};
