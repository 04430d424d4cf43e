//! The in-memory ledger: closed totals, open sessions and last-seen names.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::player::PlayerId;

/// Aggregate playtime state for every tracked player.
///
/// A `Ledger` holds no I/O; persistence and locking live in the store that
/// owns it. Maps are ordered so that iteration (and therefore snapshots and
/// name tie-breaking) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub(crate) totals: BTreeMap<PlayerId, u64>,
    pub(crate) active: BTreeMap<PlayerId, DateTime<Utc>>,
    pub(crate) names: BTreeMap<PlayerId, String>,
    pub(crate) last_saved: Option<DateTime<Utc>>,
}

/// A session that was closed by a logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedSession {
    pub player: PlayerId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Whole seconds credited to the player's total.
    pub seconds: u64,
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// A session was open and has been folded into the closed total.
    Closed(ClosedSession),
    /// No session was open for the player; nothing was credited.
    NoActiveSession,
}

impl LogoutOutcome {
    /// Seconds credited by this logout (zero when no session was open).
    #[must_use]
    pub const fn seconds(&self) -> u64 {
        match self {
            Self::Closed(session) => session.seconds,
            Self::NoActiveSession => 0,
        }
    }
}

/// Whole seconds between two instants, clamped at zero.
///
/// A clock that went backwards yields zero rather than a negative span.
#[must_use]
pub fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let secs = end.signed_duration_since(start).num_seconds();
    u64::try_from(secs).unwrap_or(0)
}

fn normalize_name(name: Option<&str>) -> Option<&str> {
    name.map(str::trim).filter(|n| !n.is_empty())
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn totals(&self) -> &BTreeMap<PlayerId, u64> {
        &self.totals
    }

    pub const fn active(&self) -> &BTreeMap<PlayerId, DateTime<Utc>> {
        &self.active
    }

    pub const fn names(&self) -> &BTreeMap<PlayerId, String> {
        &self.names
    }

    pub const fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub const fn set_last_saved(&mut self, at: DateTime<Utc>) {
        self.last_saved = Some(at);
    }

    /// Seconds from completed sessions only.
    pub fn closed_total(&self, player: &PlayerId) -> u64 {
        self.totals.get(player).copied().unwrap_or(0)
    }

    /// Start instant of the player's open session, if any.
    pub fn active_since(&self, player: &PlayerId) -> Option<DateTime<Utc>> {
        self.active.get(player).copied()
    }

    pub fn name(&self, player: &PlayerId) -> Option<&str> {
        self.names.get(player).map(String::as_str)
    }

    /// True when no totals and no open sessions are recorded.
    ///
    /// Cached names alone do not make a ledger non-empty.
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty() && self.active.is_empty()
    }

    /// Opens a session for `player` at `now`.
    ///
    /// A second login without a logout overwrites the start instant; the
    /// previous start is returned so callers can report it.
    pub fn start_session(
        &mut self,
        player: PlayerId,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.remember_name(player, name);
        self.active.insert(player, now)
    }

    /// Closes the player's open session at `end` and credits whole seconds.
    pub fn end_session(
        &mut self,
        player: PlayerId,
        name: Option<&str>,
        end: DateTime<Utc>,
    ) -> LogoutOutcome {
        self.remember_name(player, name);
        let Some(started_at) = self.active.remove(&player) else {
            return LogoutOutcome::NoActiveSession;
        };
        let seconds = elapsed_secs(started_at, end);
        let total = self.totals.entry(player).or_insert(0);
        *total = total.saturating_add(seconds);
        LogoutOutcome::Closed(ClosedSession {
            player,
            started_at,
            ended_at: end,
            seconds,
        })
    }

    /// Players with an open session, in identity order.
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.active.keys().copied().collect()
    }

    /// Zeroes every total and drops every open session. Names are kept.
    pub fn reset(&mut self) {
        self.totals.clear();
        self.active.clear();
    }

    /// Records `name` as the player's last-seen name.
    ///
    /// Returns true if the cache changed.
    pub fn remember_name(&mut self, player: PlayerId, name: Option<&str>) -> bool {
        let Some(name) = normalize_name(name) else {
            return false;
        };
        if self.names.get(&player).is_some_and(|n| n == name) {
            return false;
        }
        self.names.insert(player, name.to_string());
        true
    }

    /// Replaces closed totals with `totals` if the ledger is empty.
    ///
    /// Returns false and leaves the ledger untouched otherwise.
    pub fn seed_totals(&mut self, totals: &BTreeMap<PlayerId, u64>) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.totals.clone_from(totals);
        true
    }
}
