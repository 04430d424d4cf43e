//! Status command for showing ledger and export state.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use pt_core::totals;
use pt_store::BackfillMarker;

use crate::Config;

use super::util;

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let store = util::open_ledger(config);
    let ledger = store.snapshot();

    writeln!(writer, "Playtime ledger status")?;
    writeln!(writer, "Ledger: {}", store.path().display())?;
    match ledger.last_saved() {
        Some(at) => writeln!(writer, "Last saved: {}", format_instant(at))?,
        None => writeln!(writer, "Last saved: never")?,
    }
    writeln!(writer, "Players: {}", ledger.totals().len())?;

    writeln!(writer, "Online: {}", ledger.active().len())?;
    for (player, since) in ledger.active() {
        writeln!(
            writer,
            "- {} since {}",
            totals::display_name(&ledger, player),
            format_instant(*since)
        )?;
    }

    match BackfillMarker::load(&config.marker_path()) {
        Ok(Some(marker)) => {
            let as_of = DateTime::from_timestamp(marker.as_of, 0)
                .map_or_else(|| marker.as_of.to_string(), format_instant);
            writeln!(
                writer,
                "Backfill: done ({} players as of {as_of})",
                marker.records_sent
            )?;
        }
        Ok(None) => writeln!(writer, "Backfill: not run")?,
        Err(e) => writeln!(writer, "Backfill: unknown ({e})")?,
    }

    if config.influx.enabled {
        writeln!(writer, "Influx export: {}", config.influx.url)?;
    } else {
        writeln!(writer, "Influx export: disabled")?;
    }

    Ok(())
}
