//! Traces of either kind of tree, tagged with their location.
//!
//! On the wire, a decoded trace reads
//! `{ "type": <code>, "location": <string>, "trace": { .. } }`, where the
//! `type` code is the one of [`OperationKind::code`] and the location `"0x"`
//! designates the world-state tree. Any other location is the hex address of
//! the account owning the storage trie.

use std::fmt::{self, Display};

use accumulator_trie::trace::{
    DeletionTrace, InsertionTrace, ReadNonZeroTrace, ReadZeroTrace, UpdateTrace,
};
use accumulator_trie::{Digest, OperationKind, Trace};
use ethereum_types::{Address, H256};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::account::Account;
use crate::world_state::{StateConfig, WORLD_STATE_LOCATION};

/// Trace over the account tree.
pub type WorldStateTrace = Trace<Address, Account>;

/// Trace over a storage trie.
pub type StorageTrace = Trace<H256, H256>;

/// Malformed trace metadata.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum WireError {
    /// The `type` field is not a known operation code.
    #[error("unknown trace type {0}")]
    UnknownType(u8),

    /// A storage location is not the hex form of an address.
    #[error("storage location {0:?} is not a 20-byte hex address")]
    BadLocation(String),
}

/// A trace over either the account tree or a storage trie.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AnyTrace {
    /// Trace over the account tree.
    WorldState(WorldStateTrace),
    /// Trace over a storage trie.
    Storage(StorageTrace),
}

/// Kind of a decoded trace, as listed in classification errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TraceKind {
    /// The operation.
    pub op: OperationKind,
    /// Whether it applies to the account tree.
    pub world_state: bool,
}

impl TraceKind {
    /// A world-state trace of kind `op`.
    pub const fn world_state(op: OperationKind) -> Self {
        Self {
            op,
            world_state: true,
        }
    }

    /// A storage trace of kind `op`.
    pub const fn storage(op: OperationKind) -> Self {
        Self {
            op,
            world_state: false,
        }
    }
}

impl Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = if self.world_state { "WS" } else { "ST" };
        write!(f, "{}{}", self.op, tree)
    }
}

/// A trace together with the location it was emitted for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedTrace {
    /// `"0x"` for the account tree, the owner's address otherwise.
    pub location: String,
    /// The trace itself.
    pub underlying: AnyTrace,
}

impl DecodedTrace {
    /// Wraps a trace over the account tree.
    pub fn world_state(trace: impl Into<WorldStateTrace>) -> Self {
        let trace = trace.into();
        Self {
            location: trace.location().to_owned(),
            underlying: AnyTrace::WorldState(trace),
        }
    }

    /// Wraps a trace over a storage trie.
    pub fn storage(trace: impl Into<StorageTrace>) -> Self {
        let trace = trace.into();
        Self {
            location: trace.location().to_owned(),
            underlying: AnyTrace::Storage(trace),
        }
    }

    /// Whether the trace applies to the account tree.
    pub const fn is_world_state(&self) -> bool {
        matches!(self.underlying, AnyTrace::WorldState(_))
    }

    /// Operation and tree kind.
    pub const fn kind(&self) -> TraceKind {
        match &self.underlying {
            AnyTrace::WorldState(t) => TraceKind::world_state(t.kind()),
            AnyTrace::Storage(t) => TraceKind::storage(t.kind()),
        }
    }

    /// `0` for reads, `1` for writes.
    pub const fn rw_flag(&self) -> u8 {
        self.kind().op.rw_flag()
    }

    /// Hash of the key, with the hash function of its tree.
    pub fn hkey(&self, config: &StateConfig) -> Digest {
        match &self.underlying {
            AnyTrace::WorldState(t) => t.hkey(&config.world_state),
            AnyTrace::Storage(t) => t.hkey(&config.storage),
        }
    }

    /// The account this trace is about: the key itself for world-state
    /// traces, the owner of the trie for storage traces.
    pub fn related_account(&self) -> Result<Address, WireError> {
        match &self.underlying {
            AnyTrace::WorldState(t) => Ok(*t.key()),
            AnyTrace::Storage(_) => parse_location(&self.location),
        }
    }
}

fn parse_location(location: &str) -> Result<Address, WireError> {
    let bad = || WireError::BadLocation(location.to_owned());
    let digits = location.strip_prefix("0x").ok_or_else(bad)?;
    let bytes = hex::decode(digits).map_err(|_| bad())?;
    if bytes.len() != Address::len_bytes() {
        return Err(bad());
    }
    Ok(Address::from_slice(&bytes))
}

#[derive(Serialize)]
struct WireRef<'a, T> {
    #[serde(rename = "type")]
    code: u8,
    location: &'a str,
    trace: &'a T,
}

#[derive(Deserialize)]
struct WireOwned {
    #[serde(rename = "type")]
    code: u8,
    location: String,
    trace: serde_json::Value,
}

fn serialize_trace<K, V, S>(location: &str, trace: &Trace<K, V>, s: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    let code = trace.kind().code();
    match trace {
        Trace::ReadZero(t) => WireRef { code, location, trace: t }.serialize(s),
        Trace::ReadNonZero(t) => WireRef { code, location, trace: t }.serialize(s),
        Trace::Insertion(t) => WireRef { code, location, trace: t }.serialize(s),
        Trace::Update(t) => WireRef { code, location, trace: t }.serialize(s),
        Trace::Deletion(t) => WireRef { code, location, trace: t }.serialize(s),
    }
}

fn deserialize_trace<K, V>(
    kind: OperationKind,
    body: serde_json::Value,
) -> Result<Trace<K, V>, serde_json::Error>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    Ok(match kind {
        OperationKind::ReadZero => serde_json::from_value::<ReadZeroTrace<K>>(body)?.into(),
        OperationKind::ReadNonZero => {
            serde_json::from_value::<ReadNonZeroTrace<K, V>>(body)?.into()
        }
        OperationKind::Insertion => serde_json::from_value::<InsertionTrace<K, V>>(body)?.into(),
        OperationKind::Update => serde_json::from_value::<UpdateTrace<K, V>>(body)?.into(),
        OperationKind::Deletion => serde_json::from_value::<DeletionTrace<K, V>>(body)?.into(),
    })
}

impl Serialize for DecodedTrace {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match &self.underlying {
            AnyTrace::WorldState(t) => serialize_trace(&self.location, t, s),
            AnyTrace::Storage(t) => serialize_trace(&self.location, t, s),
        }
    }
}

impl<'de> Deserialize<'de> for DecodedTrace {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let wire = WireOwned::deserialize(d)?;
        let kind = OperationKind::from_code(wire.code)
            .ok_or_else(|| D::Error::custom(WireError::UnknownType(wire.code)))?;

        let underlying = if wire.location == WORLD_STATE_LOCATION {
            AnyTrace::WorldState(deserialize_trace(kind, wire.trace).map_err(D::Error::custom)?)
        } else {
            AnyTrace::Storage(deserialize_trace(kind, wire.trace).map_err(D::Error::custom)?)
        };

        Ok(Self {
            location: wire.location,
            underlying,
        })
    }
}
