//! Storage layer for the playtime ledger.
//!
//! Provides crash-safe persistence of the ledger as a single JSON snapshot.
//!
//! # Durability
//!
//! Every login and logout saves before returning, so an open session's start
//! instant survives a crash. Saves write a sibling `.tmp` file, fsync it and
//! rename it over the snapshot, so readers never observe a partial file. A
//! [`Checkpointer`] flushes periodically as a safety net for saves that
//! failed on the eager path.
//!
//! # Thread Safety
//!
//! [`DurableLedger`] serializes every mutation and read behind one
//! `std::sync::Mutex` and is meant to be shared as `Arc<DurableLedger>`.
//! Across processes, hold a [`DataDirLock`] while mutating.
//!
//! # Failure Policy
//!
//! Nothing in normal operation is fatal. Unreadable snapshots load as empty,
//! failed eager saves are logged and retried by the next checkpoint, and
//! export failures never reach ledger operations.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod backfill;
mod checkpoint;
mod ledger;
mod lock;
mod tracker;

pub use backfill::{BackfillError, BackfillMarker, BackfillOptions, BackfillOutcome, BackfillSource};
pub use checkpoint::{Checkpointer, DEFAULT_CHECKPOINT_INTERVAL};
pub use ledger::{DirtyState, DurableLedger};
pub use lock::DataDirLock;
pub use tracker::SessionTracker;

/// File name of the ledger snapshot inside the data directory.
pub const LEDGER_FILE: &str = "playtime-ledger.json";

/// File name of the backfill marker inside the data directory.
pub const BACKFILL_MARKER_FILE: &str = "playtime-backfill.done";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing a file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The ledger could not be encoded.
    #[error(transparent)]
    Codec(#[from] pt_core::CodecError),
    /// Another process holds the data directory lock.
    #[error("{} is locked by another process", path.display())]
    Locked { path: PathBuf },
    /// The lock file could not be opened or locked.
    #[error("failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Returns `<path>.<suffix>` alongside `path`.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes `bytes` to `path` so that readers see either the old or new file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sibling_path(path, "tmp");
    let result = write_synced(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
