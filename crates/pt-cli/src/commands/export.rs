//! Implementation of the `pt export` command.
//!
//! Pushes every player's total, including open sessions, to InfluxDB and
//! waits for the write to finish.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use pt_store::SessionTracker;

use crate::Config;

use super::util::{self, ExportSink};

pub fn run<W: Write>(writer: &mut W, config: &Config, now: DateTime<Utc>) -> Result<()> {
    if !config.influx.enabled {
        bail!("influx export is disabled; set [influx] enabled = true");
    }

    let runtime = util::oneshot_runtime()?;
    let export = ExportSink::start(config, runtime.handle())?;
    let store = Arc::new(util::open_ledger(config));
    let tracker = SessionTracker::new(store, export.sink(), false);

    let queued = tracker.export_totals(now);
    drop(tracker);
    runtime.block_on(export.finish());

    writeln!(writer, "Exported {queued} player totals.")?;
    Ok(())
}
