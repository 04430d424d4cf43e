//! Long-running host bridge.
//!
//! Reads one JSON event per line from the host (typically a game server
//! wrapper writing to our stdin) until a `shutdown` event or EOF:
//!
//! ```text
//! {"type":"login","player":"<uuid>","name":"Alex"}
//! {"type":"logout","player":"<uuid>","name":"Alex"}
//! {"type":"roster","players":[{"player":"<uuid>","name":"Alex"}]}
//! {"type":"tick"}
//! {"type":"shutdown"}
//! ```
//!
//! Checkpoints run in the background, and totals are exported on a timer
//! when auto-export is enabled.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pt_core::{MetricsSink, PlayerId, RosterEntry};
use pt_store::{BackfillOutcome, Checkpointer, DurableLedger, SessionTracker};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

use crate::Config;

use super::backfill;
use super::util::{self, ExportSink};

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostEvent {
    Login {
        player: PlayerId,
        #[serde(default)]
        name: Option<String>,
    },
    Logout {
        player: PlayerId,
        #[serde(default)]
        name: Option<String>,
    },
    Roster {
        players: Vec<RosterEntry>,
    },
    Tick,
    Shutdown,
}

/// Counters reported when serving ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub events: usize,
    pub skipped: usize,
    pub closed_at_shutdown: usize,
}

/// Entry point for `pt serve`: lock, backfill, then bridge stdin.
pub fn run(config: &Config) -> Result<()> {
    let _lock = util::lock_data_dir(config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let export = ExportSink::start(config, runtime.handle())?;
    let store = Arc::new(util::open_ledger(config));

    runtime.block_on(startup_backfill(config, &store, export.sink().as_ref()));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = runtime.block_on(serve(stdin, config, Arc::clone(&store), export.sink()));
    runtime.block_on(export.finish());

    tracing::info!(
        events = stats.events,
        skipped = stats.skipped,
        closed = stats.closed_at_shutdown,
        "serve stopped"
    );
    Ok(())
}

async fn startup_backfill(config: &Config, store: &DurableLedger, sink: &dyn MetricsSink) {
    if !config.backfill.enabled {
        return;
    }
    match backfill::run_with(config, &config.backfill, store, sink, Utc::now()).await {
        Ok(BackfillOutcome::Completed { records_sent, .. }) => {
            tracing::info!(records_sent, "startup backfill completed");
        }
        Ok(outcome) => tracing::debug!(?outcome, "startup backfill skipped"),
        Err(e) => tracing::error!(error = %format!("{e:#}"), "startup backfill failed"),
    }
}

/// Applies host events from `input` until shutdown or EOF, then closes every
/// open session and flushes the ledger.
pub async fn serve<R>(
    input: R,
    config: &Config,
    store: Arc<DurableLedger>,
    sink: Arc<dyn MetricsSink>,
) -> ServeStats
where
    R: AsyncBufRead + Unpin,
{
    let tracker = SessionTracker::new(Arc::clone(&store), sink, config.sessions.enabled);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let checkpointer = Checkpointer::new(Arc::clone(&store), config.checkpoint_interval());
    let checkpoints = tokio::spawn(checkpointer.run(shutdown_rx));

    let mut export_timer = config.auto_export_interval().map(|period| {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });
    // The first tick of an interval completes immediately.
    if let Some(timer) = export_timer.as_mut() {
        timer.tick().await;
    }

    let mut stats = ServeStats::default();
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to read host events");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<HostEvent>(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, line = %line, "skipping malformed host event");
                        stats.skipped += 1;
                        continue;
                    }
                };
                stats.events += 1;
                if !apply(&tracker, &store, event, Utc::now()) {
                    break;
                }
            }
            () = next_export(&mut export_timer) => {
                let queued = tracker.export_totals(Utc::now());
                tracing::debug!(queued, "auto-export");
            }
        }
    }

    stats.closed_at_shutdown = tracker.shutdown(Utc::now()).len();

    let _ = shutdown_tx.send(true);
    if let Err(e) = checkpoints.await {
        tracing::error!(error = %e, "checkpoint task panicked");
    }
    stats
}

/// Applies one event. Returns false when the host asked to shut down.
fn apply(
    tracker: &SessionTracker,
    store: &DurableLedger,
    event: HostEvent,
    now: DateTime<Utc>,
) -> bool {
    match event {
        HostEvent::Login { player, name } => tracker.login(player, name.as_deref(), now),
        HostEvent::Logout { player, name } => {
            tracker.logout(player, name.as_deref(), now);
        }
        HostEvent::Roster { players } => {
            let changed = store.refresh_names(&players);
            tracing::debug!(players = players.len(), changed, "roster refreshed");
        }
        HostEvent::Tick => {
            if let Err(e) = store.checkpoint() {
                tracing::error!(error = %e, "checkpoint failed");
            }
        }
        HostEvent::Shutdown => return false,
    }
    true
}

async fn next_export(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
