//! Core domain logic for the playtime ledger.
//!
//! This crate contains the fundamental types and logic for:
//! - Ledger: closed totals, open sessions and the name cache
//! - Codec: the durable JSON snapshot format
//! - Totals: live "including active" views over a ledger
//! - Sink: the contract for exporting totals and session events
//! - Stats: reading historical per-player play time from a stats directory

pub mod codec;
mod ledger;
mod player;
pub mod sink;
pub mod stats;
pub mod totals;

pub use codec::{CodecError, DecodedSnapshot, decode_snapshot, encode_snapshot};
pub use ledger::{ClosedSession, Ledger, LogoutOutcome, elapsed_secs};
pub use player::{InvalidPlayerId, PlayerId, RosterEntry};
pub use sink::{
    Delivery, MetricsSink, NoopSink, SessionEvent, SessionEventKind, SessionSummary, SinkError,
};
