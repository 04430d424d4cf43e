//! One-time import of historical totals.
//!
//! A backfill publishes a single totals snapshot to the metrics sink, stamped
//! with a configurable `as_of` instant, waits for it to be delivered, and then
//! leaves a marker file so that later starts skip it. When the totals come from a stats directory, an
//! empty ledger can also be seeded from them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pt_core::stats::{self, StatsError};
use pt_core::{MetricsSink, PlayerId, SinkError, totals};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::DurableLedger;
use crate::{StoreError, write_atomic};

/// Where historical totals come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillSource {
    /// The ledger's own totals, including open sessions.
    #[default]
    Ledger,
    /// A directory of per-player `<uuid>.json` stats files.
    Stats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillOptions {
    pub enabled: bool,
    /// Skip the run entirely once a marker exists.
    pub only_once: bool,
    /// RFC 3339 timestamp for the exported points. Blank means now.
    pub as_of: Option<String>,
    pub source: BackfillSource,
    pub stats_dir: Option<PathBuf>,
    /// Seed an empty ledger from stats-directory totals.
    pub seed_ledger: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            only_once: true,
            as_of: None,
            source: BackfillSource::Ledger,
            stats_dir: None,
            seed_ledger: true,
        }
    }
}

/// Contents of the marker left by a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillMarker {
    pub records_sent: usize,
    /// Epoch seconds.
    pub as_of: i64,
}

impl BackfillMarker {
    /// Reads the marker at `path`, if there is one.
    ///
    /// A marker that exists but does not parse still counts as present, with
    /// zeroed fields.
    pub fn load(path: &Path) -> Result<Option<Self>, BackfillError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BackfillError::Marker {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable backfill marker");
                Ok(Some(Self {
                    records_sent: 0,
                    as_of: 0,
                }))
            }
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), BackfillError> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(|e| BackfillError::Marker {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        bytes.push(b'\n');
        write_atomic(path, &bytes).map_err(|source| BackfillError::Marker {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Disabled,
    AlreadyDone,
    NoRecords,
    Completed {
        records_sent: usize,
        as_of: DateTime<Utc>,
        seeded: bool,
    },
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("failed to read stats directory: {0}")]
    Stats(#[from] StatsError),
    #[error("backfill source is `stats` but no stats_dir is configured")]
    MissingStatsDir,
    #[error("failed to publish backfill totals: {0}")]
    Sink(#[from] SinkError),
    #[error("failed to access backfill marker {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parses an RFC 3339 `as_of`, falling back to `now` when blank or invalid.
pub fn resolve_as_of(as_of: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = as_of.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(as_of = raw, error = %e, "invalid backfill as_of, using current time");
            now
        }
    }
}

/// Runs the backfill described by `options`.
///
/// No marker is written unless the sink reports the totals delivered, so a
/// failed or empty run is attempted again on the next start.
pub async fn run_backfill(
    store: &DurableLedger,
    sink: &dyn MetricsSink,
    options: &BackfillOptions,
    marker_path: &Path,
    now: DateTime<Utc>,
) -> Result<BackfillOutcome, BackfillError> {
    if !options.enabled {
        return Ok(BackfillOutcome::Disabled);
    }
    if options.only_once {
        if let Some(marker) = BackfillMarker::load(marker_path)? {
            tracing::info!(
                path = %marker_path.display(),
                records_sent = marker.records_sent,
                "backfill already done"
            );
            return Ok(BackfillOutcome::AlreadyDone);
        }
    }

    let as_of = resolve_as_of(options.as_of.as_deref(), now);
    let records = read_source(store, options, as_of)?;
    if records.is_empty() {
        tracing::info!(source = ?options.source, "backfill found no records");
        return Ok(BackfillOutcome::NoRecords);
    }

    sink.deliver_totals(&records, as_of).await?;

    let seeded = options.source == BackfillSource::Stats
        && options.seed_ledger
        && store.seed_totals(&records)?;

    let marker = BackfillMarker {
        records_sent: records.len(),
        as_of: as_of.timestamp(),
    };
    marker.write(marker_path)?;

    tracing::info!(
        records_sent = records.len(),
        as_of = %as_of.to_rfc3339(),
        seeded,
        "backfill completed"
    );
    Ok(BackfillOutcome::Completed {
        records_sent: records.len(),
        as_of,
        seeded,
    })
}

fn read_source(
    store: &DurableLedger,
    options: &BackfillOptions,
    as_of: DateTime<Utc>,
) -> Result<BTreeMap<PlayerId, u64>, BackfillError> {
    match options.source {
        BackfillSource::Ledger => Ok(totals::all_totals_including_active(&store.snapshot(), as_of)),
        BackfillSource::Stats => {
            let dir = options
                .stats_dir
                .as_deref()
                .ok_or(BackfillError::MissingStatsDir)?;
            Ok(stats::read_stats_dir(dir)?)
        }
    }
}
