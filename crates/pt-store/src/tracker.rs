//! Host-facing session tracking: ledger updates plus export notifications.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pt_core::{
    ClosedSession, LogoutOutcome, MetricsSink, PlayerId, SessionEvent, SessionEventKind,
    SessionSummary, totals,
};

use crate::ledger::DurableLedger;

/// Drives the ledger from host login/logout events and mirrors them to a
/// metrics sink.
///
/// Ledger state always changes first; sink notifications are best effort
/// and their failures are logged, never returned.
#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<DurableLedger>,
    sink: Arc<dyn MetricsSink>,
    session_events: bool,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("store", &self.store)
            .field("session_events", &self.session_events)
            .finish_non_exhaustive()
    }
}

impl SessionTracker {
    pub fn new(store: Arc<DurableLedger>, sink: Arc<dyn MetricsSink>, session_events: bool) -> Self {
        Self {
            store,
            sink,
            session_events,
        }
    }

    pub const fn store(&self) -> &Arc<DurableLedger> {
        &self.store
    }

    pub fn login(&self, player: PlayerId, name: Option<&str>, now: DateTime<Utc>) {
        self.store.on_login(player, name, now);
        tracing::info!(player = %player, name = name.unwrap_or(""), "session started");
        if self.session_events {
            self.send_event(player, name, SessionEventKind::Start, now);
        }
    }

    pub fn logout(&self, player: PlayerId, name: Option<&str>, now: DateTime<Utc>) -> LogoutOutcome {
        let outcome = self.store.on_logout(player, name, now);
        if let LogoutOutcome::Closed(session) = &outcome {
            tracing::info!(player = %player, seconds = session.seconds, "session ended");
        }
        if self.session_events {
            self.send_event(player, name, SessionEventKind::End, now);
            if let LogoutOutcome::Closed(session) = &outcome {
                self.send_summary(session, name);
            }
        }
        outcome
    }

    /// Ends every open session and flushes the ledger.
    pub fn shutdown(&self, now: DateTime<Utc>) -> Vec<ClosedSession> {
        let ledger = self.store.snapshot();
        let closed = self.store.close_all_sessions(now);
        if self.session_events {
            for session in &closed {
                let name = ledger.name(&session.player);
                self.send_event(session.player, name, SessionEventKind::End, now);
                self.send_summary(session, name);
            }
        }
        if let Err(e) = self.store.checkpoint() {
            tracing::error!(error = %e, "final checkpoint failed");
        }
        tracing::info!(closed = closed.len(), "closed open sessions at shutdown");
        closed
    }

    /// Publishes every player's live total. Returns the number queued.
    pub fn export_totals(&self, now: DateTime<Utc>) -> usize {
        let totals = totals::all_totals_including_active(&self.store.snapshot(), now);
        if totals.is_empty() {
            return 0;
        }
        match self.sink.publish_totals(&totals, now) {
            Ok(()) => totals.len(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to queue totals export");
                0
            }
        }
    }

    fn send_event(&self, player: PlayerId, name: Option<&str>, kind: SessionEventKind, at: DateTime<Utc>) {
        let event = SessionEvent {
            player,
            name: name.map(str::to_string),
            kind,
            at,
        };
        if let Err(e) = self.sink.publish_session_event(event) {
            tracing::warn!(player = %player, %kind, error = %e, "failed to queue session event");
        }
    }

    fn send_summary(&self, session: &ClosedSession, name: Option<&str>) {
        let summary = SessionSummary {
            player: session.player,
            name: name.map(str::to_string),
            started_at: session.started_at,
            ended_at: session.ended_at,
            duration_secs: session.seconds,
        };
        if let Err(e) = self.sink.publish_session_summary(summary) {
            tracing::warn!(player = %session.player, error = %e, "failed to queue session summary");
        }
    }
}
