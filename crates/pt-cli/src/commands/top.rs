//! Leaderboard command.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pt_core::{Ledger, PlayerId, totals};
use serde::Serialize;

use crate::Config;

use super::util;

#[derive(Debug, Serialize)]
pub struct TopRow {
    pub rank: usize,
    pub player: PlayerId,
    pub name: String,
    pub seconds: u64,
    pub online: bool,
}

pub fn leaderboard_rows(ledger: &Ledger, limit: usize, now: DateTime<Utc>) -> Vec<TopRow> {
    let all = totals::all_totals_including_active(ledger, now);
    totals::leaderboard(&all, limit)
        .into_iter()
        .enumerate()
        .map(|(i, (player, seconds))| TopRow {
            rank: i + 1,
            player,
            name: totals::display_name(ledger, &player),
            seconds,
            online: ledger.active_since(&player).is_some(),
        })
        .collect()
}

pub fn format_top(rows: &[TopRow]) -> String {
    let mut output = String::new();
    if rows.is_empty() {
        output.push_str("No playtime recorded.\n");
        return output;
    }

    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);
    output.push_str("PLAYTIME LEADERBOARD\n");
    output.push_str("────────────────────\n");
    for row in rows {
        let marker = if row.online { "  (online)" } else { "" };
        let _ = writeln!(
            output,
            "{:>2}. {:<width$}  {:>12}{marker}",
            row.rank,
            row.name,
            totals::format_duration(row.seconds),
        );
    }
    output
}

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    limit: usize,
    json: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let ledger = util::open_ledger(config).snapshot();
    let rows = leaderboard_rows(&ledger, limit, now);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        write!(writer, "{}", format_top(&rows))?;
    }
    Ok(())
}
