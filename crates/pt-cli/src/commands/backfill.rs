//! Implementation of the `pt backfill` command.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use pt_core::MetricsSink;
use pt_store::{BackfillOptions, BackfillOutcome, DurableLedger, backfill};

use crate::Config;

use super::util::{self, ExportSink};

/// Runs a backfill against the data directory's marker.
///
/// Shared by `pt backfill` and `pt serve` startup. The caller holds the data
/// directory lock.
pub async fn run_with(
    config: &Config,
    options: &BackfillOptions,
    store: &DurableLedger,
    sink: &dyn MetricsSink,
    now: DateTime<Utc>,
) -> Result<BackfillOutcome> {
    let marker = config.marker_path();
    backfill::run_backfill(store, sink, options, &marker, now)
        .await
        .with_context(|| format!("backfill failed; {} not written", marker.display()))
}

pub fn run<W: Write>(writer: &mut W, config: &Config, force: bool, now: DateTime<Utc>) -> Result<()> {
    let _lock = util::lock_data_dir(config)?;

    let options = BackfillOptions {
        enabled: true,
        only_once: config.backfill.only_once && !force,
        ..config.backfill.clone()
    };

    let runtime = util::oneshot_runtime()?;
    let export = ExportSink::start(config, runtime.handle())?;
    let exporting = export.is_exporting();
    let store = util::open_ledger(config);
    let outcome = runtime.block_on(async {
        let sink = export.sink();
        let outcome = run_with(config, &options, &store, sink.as_ref(), now).await;
        drop(sink);
        export.finish().await;
        outcome
    })?;

    writeln!(writer, "{}", describe(&outcome))?;
    if !exporting && matches!(outcome, BackfillOutcome::Completed { .. }) {
        writeln!(writer, "Totals were not exported; influx is disabled.")?;
    }
    Ok(())
}

pub fn describe(outcome: &BackfillOutcome) -> String {
    match outcome {
        BackfillOutcome::Disabled => "Backfill is disabled.".to_string(),
        BackfillOutcome::AlreadyDone => {
            "Backfill already done; use --force to run it again.".to_string()
        }
        BackfillOutcome::NoRecords => "Backfill found no records.".to_string(),
        BackfillOutcome::Completed {
            records_sent,
            as_of,
            seeded,
        } => {
            let mut message = format!(
                "Backfilled {records_sent} players as of {}.",
                as_of.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
            if *seeded {
                message.push_str(" Ledger seeded from stats.");
            }
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use insta::assert_snapshot;
    use pt_store::{BackfillMarker, BackfillSource};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config {
            data_dir: dir.path().join("data"),
            ..Config::default()
        };
        let stats_dir = dir.path().join("stats");
        std::fs::create_dir_all(&stats_dir).unwrap();
        std::fs::write(
            stats_dir.join("ec561538-f3fd-461d-aff5-086b22154bce.json"),
            r#"{"stats":{"minecraft:custom":{"minecraft:play_time":72000}}}"#,
        )
        .unwrap();
        config.backfill.source = BackfillSource::Stats;
        config.backfill.stats_dir = Some(stats_dir);
        config
    }

    #[test]
    fn describe_outcomes() {
        assert_snapshot!(
            describe(&BackfillOutcome::Completed {
                records_sent: 3,
                as_of: t0(),
                seeded: true,
            }),
            @"Backfilled 3 players as of 2025-03-01T12:00:00Z. Ledger seeded from stats."
        );
        assert_snapshot!(describe(&BackfillOutcome::AlreadyDone), @"Backfill already done; use --force to run it again.");
    }

    #[test]
    fn stats_backfill_seeds_without_influx() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let mut first = Vec::new();
        run(&mut first, &config, false, t0()).unwrap();
        let mut second = Vec::new();
        run(&mut second, &config, false, t0()).unwrap();

        assert_snapshot!(String::from_utf8(first).unwrap(), @r"
        Backfilled 1 players as of 2025-03-01T12:00:00Z. Ledger seeded from stats.
        Totals were not exported; influx is disabled.
        ");
        assert!(String::from_utf8(second).unwrap().starts_with("Backfill already done"));
        assert_eq!(
            BackfillMarker::load(&config.marker_path()).unwrap(),
            Some(BackfillMarker {
                records_sent: 1,
                as_of: t0().timestamp(),
            })
        );
        let ledger = util::open_ledger(&config).snapshot();
        assert_eq!(ledger.closed_total(&"ec561538-f3fd-461d-aff5-086b22154bce".parse().unwrap()), 3600);
    }

    #[test]
    fn unreachable_influx_leaves_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.influx.enabled = true;
        config.influx.url = "http://127.0.0.1:9".to_string();

        let err = run(&mut Vec::new(), &config, false, t0()).unwrap_err();

        assert!(format!("{err:#}").contains("not written"), "{err:#}");
        assert!(!config.marker_path().exists());
        assert!(util::open_ledger(&config).snapshot().totals().is_empty());
    }
}
