//! Read-only views over a ledger.
//!
//! Nothing here mutates state. Callers pass `now` explicitly so results are
//! reproducible and the same instant is used for every player in a view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::ledger::{Ledger, elapsed_secs};
use crate::player::{PlayerId, RosterEntry};

/// Closed total plus the elapsed part of any open session.
pub fn total_including_active(ledger: &Ledger, player: &PlayerId, now: DateTime<Utc>) -> u64 {
    let closed = ledger.closed_total(player);
    match ledger.active_since(player) {
        Some(started_at) => closed.saturating_add(elapsed_secs(started_at, now)),
        None => closed,
    }
}

/// Seconds from completed sessions only.
pub fn total_excluding_active(ledger: &Ledger, player: &PlayerId) -> u64 {
    ledger.closed_total(player)
}

/// Live totals for every player with a closed total or an open session.
pub fn all_totals_including_active(ledger: &Ledger, now: DateTime<Utc>) -> BTreeMap<PlayerId, u64> {
    let mut out = ledger.totals().clone();
    for (player, started_at) in ledger.active() {
        let total = out.entry(*player).or_insert(0);
        *total = total.saturating_add(elapsed_secs(*started_at, now));
    }
    out
}

/// Highest totals first; ties are broken by player id for stable output.
pub fn leaderboard(totals: &BTreeMap<PlayerId, u64>, limit: usize) -> Vec<(PlayerId, u64)> {
    let mut rows: Vec<_> = totals.iter().map(|(p, s)| (*p, *s)).collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(limit);
    rows
}

/// Cached name, or a short prefix of the id when none was ever seen.
pub fn display_name(ledger: &Ledger, player: &PlayerId) -> String {
    ledger
        .name(player)
        .map_or_else(|| player.short(), str::to_string)
}

/// Resolves a display name to a player, ignoring case.
///
/// The live roster is searched before cached names, since a name currently
/// in use is the better answer when a name has moved between players.
/// Duplicates resolve to the first match: roster order, then id order.
pub fn lookup_by_name(ledger: &Ledger, name: &str, roster: &[RosterEntry]) -> Option<PlayerId> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    roster
        .iter()
        .find(|entry| same_name(&entry.name, name))
        .map(|entry| entry.player)
        .or_else(|| {
            ledger
                .names()
                .iter()
                .find(|(_, cached)| same_name(cached, name))
                .map(|(player, _)| *player)
        })
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

/// Formats seconds as `"{days}d {hours}h {minutes}m"`.
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}
