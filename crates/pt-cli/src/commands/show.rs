//! Single-player lookup.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use pt_core::totals;

use crate::Config;

use super::util;

pub fn run<W: Write>(writer: &mut W, config: &Config, query: &str, now: DateTime<Utc>) -> Result<()> {
    let ledger = util::open_ledger(config).snapshot();
    let Some(player) = util::resolve_player(&ledger, query) else {
        bail!("no player named {query:?}");
    };

    let total = totals::total_including_active(&ledger, &player, now);
    writeln!(writer, "{} ({player})", totals::display_name(&ledger, &player))?;
    writeln!(writer, "Total: {}", totals::format_duration(total))?;
    match ledger.active_since(&player) {
        Some(since) => writeln!(
            writer,
            "Online since {}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?,
        None => writeln!(writer, "Offline")?,
    }
    Ok(())
}
