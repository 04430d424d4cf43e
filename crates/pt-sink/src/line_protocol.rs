//! InfluxDB line protocol encoding.
//!
//! Every point carries a single `duration` field and a nanosecond timestamp.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use pt_core::{PlayerId, SessionEvent, SessionEventKind, SessionSummary};

use crate::settings::{InfluxSettings, SessionExportSettings};

/// Replaces the characters line protocol treats as separators.
pub fn sanitize(value: &str) -> String {
    value.replace([' ', ','], "_")
}

fn timestamp_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(0)
}

fn event_tag(kind: SessionEventKind) -> &'static str {
    match kind {
        SessionEventKind::Start => "join",
        SessionEventKind::End => "leave",
    }
}

fn push_tags(line: &mut String, server_tag: &str, player: PlayerId, name: Option<&str>) {
    if !server_tag.is_empty() {
        let _ = write!(line, ",server={}", sanitize(server_tag));
    }
    let _ = write!(line, ",uuid={player}");
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        let _ = write!(line, ",username={}", sanitize(name));
    }
}

/// One line per player, all stamped `at`.
pub fn totals_lines(
    settings: &InfluxSettings,
    totals: &BTreeMap<PlayerId, u64>,
    at: DateTime<Utc>,
) -> String {
    let measurement = sanitize(&settings.measurement);
    let ts = timestamp_nanos(at);
    totals
        .iter()
        .map(|(player, seconds)| {
            let mut line = measurement.clone();
            push_tags(&mut line, &settings.server_tag, *player, None);
            let _ = write!(line, " duration={seconds} {ts}");
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A join or leave point. The field holds the event time in epoch seconds.
pub fn event_line(
    settings: &InfluxSettings,
    sessions: &SessionExportSettings,
    event: &SessionEvent,
) -> String {
    let mut line = sanitize(&sessions.event_measurement);
    let name = sessions
        .include_name_tag
        .then_some(event.name.as_deref())
        .flatten();
    push_tags(&mut line, &settings.server_tag, event.player, name);
    let _ = write!(
        line,
        ",event={} duration={} {}",
        event_tag(event.kind),
        event.at.timestamp(),
        timestamp_nanos(event.at)
    );
    line
}

/// A closed-session point stamped at the session's end.
pub fn summary_line(
    settings: &InfluxSettings,
    sessions: &SessionExportSettings,
    summary: &SessionSummary,
) -> String {
    let mut line = sanitize(&sessions.measurement);
    let name = sessions
        .include_name_tag
        .then_some(summary.name.as_deref())
        .flatten();
    push_tags(&mut line, &settings.server_tag, summary.player, name);
    let _ = write!(
        line,
        " duration={} {}",
        summary.duration_secs,
        timestamp_nanos(summary.ended_at)
    );
    line
}
