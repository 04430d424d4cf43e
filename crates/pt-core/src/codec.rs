//! Durable snapshot format.
//!
//! The ledger is stored as a single JSON object:
//!
//! ```json
//! {
//!   "updated": 1740830400,
//!   "totals_sec": { "<uuid>": 3600 },
//!   "active_ns": { "<uuid>": 1740830400000000000 },
//!   "names": { "<uuid>": "Steve" }
//! }
//! ```
//!
//! Decoding is lenient in two directions:
//! - Unknown top-level fields are ignored and missing ones default to empty,
//!   so older and newer writers can share a file.
//! - Individual entries with a key that is not a UUID, or a value of the
//!   wrong type, are skipped with a warning instead of failing the load.
//!
//! Only a top level that is not an object of this shape is an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ledger::Ledger;
use crate::player::PlayerId;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Snapshot encoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The snapshot could not be parsed at the top level.
    #[error("malformed snapshot: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The ledger could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A decoded ledger and the number of entries that had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSnapshot {
    pub ledger: Ledger,
    pub skipped: usize,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    updated: i64,
    totals_sec: &'a BTreeMap<PlayerId, u64>,
    active_ns: BTreeMap<PlayerId, i64>,
    names: &'a BTreeMap<PlayerId, String>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    updated: Option<Value>,
    #[serde(default)]
    totals_sec: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    active_ns: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    names: Option<BTreeMap<String, Value>>,
}

/// Converts an instant to nanoseconds since the Unix epoch.
///
/// Returns `None` outside the representable range (years 1677..2262).
pub fn to_epoch_nanos(at: DateTime<Utc>) -> Option<i64> {
    at.timestamp_nanos_opt()
}

/// Converts nanoseconds since the Unix epoch to an instant.
pub fn from_epoch_nanos(nanos: i64) -> Option<DateTime<Utc>> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let subsec = u32::try_from(nanos.rem_euclid(NANOS_PER_SEC)).ok()?;
    DateTime::from_timestamp(secs, subsec)
}

/// Serializes `ledger` as pretty-printed JSON, stamped with `updated`.
pub fn encode_snapshot(ledger: &Ledger, updated: DateTime<Utc>) -> Result<Vec<u8>, CodecError> {
    let mut active_ns = BTreeMap::new();
    for (player, started_at) in &ledger.active {
        match to_epoch_nanos(*started_at) {
            Some(ns) => {
                active_ns.insert(*player, ns);
            }
            None => {
                tracing::warn!(player = %player, %started_at, "session start out of range, not persisted");
            }
        }
    }

    let out = SnapshotOut {
        updated: updated.timestamp(),
        totals_sec: &ledger.totals,
        active_ns,
        names: &ledger.names,
    };
    serde_json::to_vec_pretty(&out).map_err(CodecError::Encode)
}

/// Parses a snapshot, skipping entries that cannot be understood.
pub fn decode_snapshot(bytes: &[u8]) -> Result<DecodedSnapshot, CodecError> {
    let raw: SnapshotIn = serde_json::from_slice(bytes).map_err(CodecError::Malformed)?;
    let mut ledger = Ledger::new();
    let mut skipped = 0;

    for (key, value) in raw.totals_sec.unwrap_or_default() {
        match (key.parse::<PlayerId>(), value.as_u64()) {
            (Ok(player), Some(secs)) => {
                ledger.totals.insert(player, secs);
            }
            _ => {
                tracing::warn!(key = %key, value = %value, "skipping malformed total");
                skipped += 1;
            }
        }
    }

    for (key, value) in raw.active_ns.unwrap_or_default() {
        let started_at = value.as_i64().and_then(from_epoch_nanos);
        match (key.parse::<PlayerId>(), started_at) {
            (Ok(player), Some(started_at)) => {
                ledger.active.insert(player, started_at);
            }
            _ => {
                tracing::warn!(key = %key, value = %value, "skipping malformed active session");
                skipped += 1;
            }
        }
    }

    for (key, value) in raw.names.unwrap_or_default() {
        match (key.parse::<PlayerId>(), value.as_str()) {
            (Ok(player), Some(name)) => {
                ledger.names.insert(player, name.to_string());
            }
            _ => {
                tracing::warn!(key = %key, value = %value, "skipping malformed name");
                skipped += 1;
            }
        }
    }

    ledger.last_saved = raw
        .updated
        .as_ref()
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(DecodedSnapshot { ledger, skipped })
}
