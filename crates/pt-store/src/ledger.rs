//! The authoritative, mutex-guarded ledger and its snapshot file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use pt_core::{
    ClosedSession, Ledger, LogoutOutcome, PlayerId, RosterEntry, decode_snapshot, encode_snapshot,
};

use crate::{StoreError, sibling_path, write_atomic};

/// Whether the in-memory ledger has changes not yet on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Clean,
    Dirty,
}

struct State {
    ledger: Ledger,
    dirty: DirtyState,
}

/// The single owner of ledger state.
///
/// Opened once at startup and shared as `Arc<DurableLedger>`. Every method
/// takes the internal lock, so concurrent callers observe and produce a
/// sequential history.
pub struct DurableLedger {
    path: PathBuf,
    state: Mutex<State>,
}

impl std::fmt::Debug for DurableLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DurableLedger {
    /// Opens the ledger stored at `path`.
    ///
    /// Never fails: a missing file is an empty ledger, and an unreadable one
    /// is logged and also treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ledger = read_ledger(&path);
        tracing::debug!(
            path = %path.display(),
            totals = ledger.totals().len(),
            active = ledger.active().len(),
            "opened ledger"
        );
        Self {
            path,
            state: Mutex::new(State {
                ledger,
                dirty: DirtyState::Clean,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces in-memory state with what is on disk, discarding unsaved
    /// changes.
    pub fn load(&self) {
        let ledger = read_ledger(&self.path);
        let mut state = self.lock();
        state.ledger = ledger;
        state.dirty = DirtyState::Clean;
    }

    /// Writes the full ledger to disk.
    ///
    /// On failure the ledger stays dirty so a later checkpoint retries.
    pub fn save(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        self.save_locked(&mut state)
    }

    fn save_locked(&self, state: &mut State) -> Result<(), StoreError> {
        let now = Utc::now();
        let bytes = encode_snapshot(&state.ledger, now)?;
        write_atomic(&self.path, &bytes).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        state.ledger.set_last_saved(now);
        state.dirty = DirtyState::Clean;
        tracing::trace!(path = %self.path.display(), "saved ledger");
        Ok(())
    }

    /// Saves after an event that must not be lost; failures are logged only.
    fn persist_eagerly(&self, state: &mut State, reason: &'static str) {
        if let Err(e) = self.save_locked(state) {
            tracing::warn!(
                reason,
                error = %e,
                "eager save failed, leaving ledger dirty for next checkpoint"
            );
        }
    }

    /// Opens a session for `player` and saves immediately.
    pub fn on_login(&self, player: PlayerId, name: Option<&str>, now: DateTime<Utc>) {
        let mut state = self.lock();
        if let Some(previous) = state.ledger.start_session(player, name, now) {
            tracing::debug!(player = %player, %previous, "login replaced an open session");
        }
        state.dirty = DirtyState::Dirty;
        self.persist_eagerly(&mut state, "login");
    }

    /// Closes the player's session, credits whole seconds and saves
    /// immediately.
    pub fn on_logout(&self, player: PlayerId, name: Option<&str>, end: DateTime<Utc>) -> LogoutOutcome {
        let mut state = self.lock();
        let outcome = state.ledger.end_session(player, name, end);
        if outcome == LogoutOutcome::NoActiveSession {
            tracing::debug!(player = %player, "logout without an open session");
        }
        state.dirty = DirtyState::Dirty;
        self.persist_eagerly(&mut state, "logout");
        outcome
    }

    /// Closes every open session at `end` with a single save.
    pub fn close_all_sessions(&self, end: DateTime<Utc>) -> Vec<ClosedSession> {
        let mut state = self.lock();
        let players = state.ledger.active_players();
        if players.is_empty() {
            return Vec::new();
        }
        let closed = players
            .into_iter()
            .filter_map(|player| match state.ledger.end_session(player, None, end) {
                LogoutOutcome::Closed(session) => Some(session),
                LogoutOutcome::NoActiveSession => None,
            })
            .collect();
        state.dirty = DirtyState::Dirty;
        self.persist_eagerly(&mut state, "close_all_sessions");
        closed
    }

    /// Zeroes all totals and open sessions. Cached names survive.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ledger.reset();
        state.dirty = DirtyState::Dirty;
        self.save_locked(&mut state)
    }

    /// Saves if there are unsaved changes. Returns whether a save happened.
    pub fn checkpoint(&self) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.dirty == DirtyState::Clean {
            return Ok(false);
        }
        self.save_locked(&mut state)?;
        Ok(true)
    }

    /// Merges live names into the name cache. Returns how many changed.
    ///
    /// Changes are left for the next checkpoint.
    pub fn refresh_names(&self, roster: &[RosterEntry]) -> usize {
        let mut state = self.lock();
        let changed = roster
            .iter()
            .filter(|entry| state.ledger.remember_name(entry.player, Some(entry.name.as_str())))
            .count();
        if changed > 0 {
            state.dirty = DirtyState::Dirty;
        }
        changed
    }

    /// Seeds closed totals into an empty ledger and saves.
    ///
    /// Returns false without changes when the ledger already has data.
    pub fn seed_totals(&self, totals: &BTreeMap<PlayerId, u64>) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if !state.ledger.seed_totals(totals) {
            return Ok(false);
        }
        state.dirty = DirtyState::Dirty;
        self.save_locked(&mut state)?;
        Ok(true)
    }

    /// A consistent point-in-time copy of the ledger.
    pub fn snapshot(&self) -> Ledger {
        self.lock().ledger.clone()
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.lock().dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_state() == DirtyState::Dirty
    }
}

/// Reads the snapshot at `path`, degrading to an empty ledger on any failure.
fn read_ledger(path: &Path) -> Ledger {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ledger::new(),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "failed to read ledger, starting empty"
            );
            return Ledger::new();
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ledger::new();
    }

    match decode_snapshot(&bytes) {
        Ok(decoded) => {
            if decoded.skipped > 0 {
                tracing::warn!(
                    path = %path.display(),
                    skipped = decoded.skipped,
                    "skipped malformed ledger entries"
                );
            }
            decoded.ledger
        }
        Err(e) => {
            let corrupt = sibling_path(path, "corrupt");
            tracing::error!(
                path = %path.display(),
                moved_to = %corrupt.display(),
                error = %e,
                "ledger snapshot is malformed, starting empty"
            );
            if let Err(e) = fs::rename(path, &corrupt) {
                tracing::error!(error = %e, "failed to move malformed ledger aside");
            }
            Ledger::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::Duration;
    use pt_core::totals;

    use super::*;
    use crate::LEDGER_FILE;
    use crate::test_support::{alex, steve, t0};

    fn open_temp() -> (tempfile::TempDir, DurableLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = DurableLedger::open(dir.path().join(LEDGER_FILE));
        (dir, ledger)
    }

    #[test]
    fn missing_file_opens_empty_and_clean() {
        let (_dir, store) = open_temp();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.dirty_state(), DirtyState::Clean);
        assert!(!store.path().exists());
    }

    #[test]
    fn login_is_persisted_before_logout() {
        let (_dir, store) = open_temp();
        store.on_login(alex(), Some("Alex"), t0());

        assert!(!store.is_dirty());
        let reopened = DurableLedger::open(store.path());
        assert_eq!(reopened.snapshot().active_since(&alex()), Some(t0()));
        assert_eq!(reopened.snapshot().name(&alex()), Some("Alex"));
    }

    #[test]
    fn login_logout_adds_elapsed_seconds() {
        let (_dir, store) = open_temp();
        store.on_login(alex(), Some("Alex"), t0());
        let outcome = store.on_logout(alex(), Some("Alex"), t0() + Duration::seconds(125));

        assert_eq!(outcome.seconds(), 125);
        let ledger = store.snapshot();
        let later = t0() + Duration::seconds(500);
        assert_eq!(totals::total_excluding_active(&ledger, &alex()), 125);
        assert_eq!(totals::total_including_active(&ledger, &alex(), later), 125);
    }

    #[test]
    fn logout_without_session_leaves_totals_unchanged() {
        let (_dir, store) = open_temp();
        store.on_login(steve(), None, t0());
        store.on_logout(steve(), None, t0() + Duration::seconds(30));

        let outcome = store.on_logout(alex(), Some("Alex"), t0());

        assert_eq!(outcome, LogoutOutcome::NoActiveSession);
        let ledger = store.snapshot();
        assert_eq!(ledger.closed_total(&alex()), 0);
        assert_eq!(ledger.closed_total(&steve()), 30);
    }

    #[test]
    fn reset_then_accumulates_from_zero() {
        let (_dir, store) = open_temp();
        store.on_login(alex(), Some("Alex"), t0());
        store.on_logout(alex(), None, t0() + Duration::seconds(300));
        store.on_login(steve(), Some("Steve"), t0());

        store.reset().unwrap();

        let ledger = store.snapshot();
        let now = t0() + Duration::seconds(600);
        assert_eq!(totals::total_including_active(&ledger, &alex(), now), 0);
        assert_eq!(totals::total_including_active(&ledger, &steve(), now), 0);
        assert_eq!(ledger.name(&alex()), Some("Alex"));

        store.on_login(alex(), None, t0() + Duration::seconds(1000));
        store.on_logout(alex(), None, t0() + Duration::seconds(1045));
        assert_eq!(store.snapshot().closed_total(&alex()), 45);

        let reopened = DurableLedger::open(store.path());
        assert_eq!(reopened.snapshot().closed_total(&alex()), 45);
        assert!(reopened.snapshot().active().is_empty());
    }

    #[test]
    fn save_load_roundtrip_is_lossless() {
        let (_dir, store) = open_temp();
        store.on_login(alex(), Some("Alex"), t0());
        store.on_logout(alex(), Some("Alex"), t0() + Duration::seconds(61));
        store.on_login(steve(), Some("Steve"), t0() + Duration::nanoseconds(987_654_321));
        store.save().unwrap();

        let before = store.snapshot();
        store.load();
        let after = store.snapshot();

        assert_eq!(after.totals(), before.totals());
        assert_eq!(after.active(), before.active());
        assert_eq!(after.names(), before.names());
    }

    #[test]
    fn checkpoint_is_noop_when_clean() {
        let (_dir, store) = open_temp();
        assert!(!store.checkpoint().unwrap());
        assert!(!store.path().exists());

        store.refresh_names(&[RosterEntry::new(alex(), "Alex")]);
        assert!(store.is_dirty());
        assert!(store.checkpoint().unwrap());
        assert!(!store.is_dirty());
        assert!(!store.checkpoint().unwrap());
    }

    #[test]
    fn failed_save_stays_dirty_until_checkpoint_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = DurableLedger::open(blocker.join(LEDGER_FILE));

        store.on_login(alex(), None, t0());
        assert!(store.is_dirty());
        assert!(matches!(store.checkpoint(), Err(StoreError::Write { .. })));

        fs::remove_file(&blocker).unwrap();
        assert!(store.checkpoint().unwrap());
        assert!(!store.is_dirty());
        let reopened = DurableLedger::open(store.path());
        assert_eq!(reopened.snapshot().active_since(&alex()), Some(t0()));
    }

    #[test]
    fn malformed_snapshot_loads_empty_and_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        fs::write(&path, b"{\"totals_sec\": [").unwrap();

        let store = DurableLedger::open(&path);

        assert!(store.snapshot().is_empty());
        let corrupt = sibling_path(&path, "corrupt");
        assert_eq!(fs::read(&corrupt).unwrap(), b"{\"totals_sec\": [");
        assert!(!path.exists());
    }

    #[test]
    fn bad_entries_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        let json = format!(
            r#"{{"totals_sec": {{"{}": 42, "player-one": 7}}, "active_ns": {{}}, "names": {{}}}}"#,
            alex()
        );
        fs::write(&path, json).unwrap();

        let store = DurableLedger::open(&path);

        assert_eq!(store.snapshot().closed_total(&alex()), 42);
        assert_eq!(store.snapshot().totals().len(), 1);
    }

    #[test]
    fn close_all_sessions_credits_everyone() {
        let (_dir, store) = open_temp();
        store.on_login(alex(), None, t0());
        store.on_login(steve(), None, t0() + Duration::seconds(20));

        let closed = store.close_all_sessions(t0() + Duration::seconds(100));

        assert_eq!(closed.len(), 2);
        let ledger = DurableLedger::open(store.path()).snapshot();
        assert!(ledger.active().is_empty());
        assert_eq!(ledger.closed_total(&alex()), 100);
        assert_eq!(ledger.closed_total(&steve()), 80);
    }

    #[test]
    fn seed_only_touches_empty_ledger() {
        let (_dir, store) = open_temp();
        let seed = BTreeMap::from([(alex(), 3600)]);

        assert!(store.seed_totals(&seed).unwrap());
        assert!(!store.seed_totals(&BTreeMap::from([(steve(), 1)])).unwrap());

        let ledger = DurableLedger::open(store.path()).snapshot();
        assert_eq!(ledger.closed_total(&alex()), 3600);
        assert_eq!(ledger.closed_total(&steve()), 0);
    }

    #[test]
    fn concurrent_logins_do_not_lose_entries() {
        let (_dir, store) = open_temp();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut players = Vec::new();
                    for _ in 0..10 {
                        let player = PlayerId::new_random();
                        store.on_login(player, None, t0());
                        players.push(player);
                    }
                    players
                })
            })
            .collect();

        let players: Vec<PlayerId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let ledger = DurableLedger::open(store.path()).snapshot();
        assert_eq!(ledger.active().len(), 80);
        for player in players {
            assert_eq!(ledger.active_since(&player), Some(t0()));
        }
    }
}
