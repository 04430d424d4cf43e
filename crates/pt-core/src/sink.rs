//! Export contract for totals and session activity.
//!
//! The engine only ever calls a [`MetricsSink`]; it never waits on delivery.
//! Implementations queue the notification and return immediately. A returned
//! error means the notification was not queued; delivery failures after
//! queueing are the implementation's to log, except for
//! [`MetricsSink::deliver_totals`], which lets a caller wait for the outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::player::PlayerId;

/// Reasons a notification could not be handed to the sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The outbound queue is at capacity.
    #[error("export queue is full")]
    QueueFull,
    /// The sink worker has shut down.
    #[error("export queue is closed")]
    Closed,
    /// Exports are turned off in configuration.
    #[error("export is disabled")]
    Disabled,
    /// The notification was queued but the backend did not accept it.
    #[error("export delivery failed: {0}")]
    Delivery(String),
}

/// Resolves once a snapshot handed to [`MetricsSink::deliver_totals`] has
/// been delivered or has failed.
pub type Delivery = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send>>;

/// Which end of a session an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventKind {
    Start,
    End,
}

impl SessionEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login or logout observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    pub player: PlayerId,
    pub name: Option<String>,
    pub kind: SessionEventKind,
    pub at: DateTime<Utc>,
}

/// One closed session, emitted once when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub player: PlayerId,
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Receives exported totals and session activity.
///
/// All methods must return without blocking on I/O.
pub trait MetricsSink: Send + Sync {
    /// Bulk snapshot of per-player seconds as of `at`.
    fn publish_totals(
        &self,
        totals: &BTreeMap<PlayerId, u64>,
        at: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    /// Publishes a totals snapshot and reports whether it was delivered.
    ///
    /// The call itself does not block; awaiting the returned [`Delivery`]
    /// does. Sinks without a delivery step resolve with the queueing result.
    fn deliver_totals(&self, totals: &BTreeMap<PlayerId, u64>, at: DateTime<Utc>) -> Delivery {
        Box::pin(future::ready(self.publish_totals(totals, at)))
    }

    fn publish_session_event(&self, event: SessionEvent) -> Result<(), SinkError>;

    fn publish_session_summary(&self, summary: SessionSummary) -> Result<(), SinkError>;
}

/// A sink that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn publish_totals(
        &self,
        _totals: &BTreeMap<PlayerId, u64>,
        _at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn publish_session_event(&self, _event: SessionEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn publish_session_summary(&self, _summary: SessionSummary) -> Result<(), SinkError> {
        Ok(())
    }
}
