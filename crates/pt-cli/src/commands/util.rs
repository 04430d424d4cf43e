//! Shared utilities for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use pt_core::{Ledger, MetricsSink, NoopSink, PlayerId, totals};
use pt_sink::{InfluxSink, SinkWorker};
use pt_store::{DataDirLock, DurableLedger};
use tokio::runtime::{Handle, Runtime};

use crate::Config;

/// Opens the ledger without taking the data directory lock.
pub fn open_ledger(config: &Config) -> DurableLedger {
    DurableLedger::open(config.ledger_path())
}

/// Takes the data directory lock for a one-shot mutating command.
pub fn lock_data_dir(config: &Config) -> Result<DataDirLock> {
    DataDirLock::try_acquire(&config.data_dir).with_context(|| {
        format!(
            "cannot modify {} while another pt process is using it",
            config.data_dir.display()
        )
    })
}

/// Single-threaded runtime for one-shot commands that export.
pub fn oneshot_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub fn parse_player(input: &str) -> Result<PlayerId> {
    input
        .parse()
        .with_context(|| format!("expected a player UUID, got {input:?}"))
}

/// Resolves a UUID or a case-insensitive cached name.
pub fn resolve_player(ledger: &Ledger, input: &str) -> Option<PlayerId> {
    input
        .parse()
        .ok()
        .or_else(|| totals::lookup_by_name(ledger, input, &[]))
}

/// The configured metrics sink and, when exporting, its background worker.
pub struct ExportSink {
    sink: Arc<dyn MetricsSink>,
    worker: Option<SinkWorker>,
}

impl ExportSink {
    /// Starts the InfluxDB sink if enabled, otherwise a sink that discards.
    pub fn start(config: &Config, runtime: &Handle) -> Result<Self> {
        if !config.influx.enabled {
            return Ok(Self {
                sink: Arc::new(NoopSink),
                worker: None,
            });
        }
        let (sink, worker) =
            InfluxSink::spawn(config.influx.clone(), config.sessions.clone(), runtime)
                .context("failed to start influx exporter")?;
        tracing::debug!(url = %config.influx.url, "influx export enabled");
        Ok(Self {
            sink: Arc::new(sink),
            worker: Some(worker),
        })
    }

    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.sink)
    }

    pub const fn is_exporting(&self) -> bool {
        self.worker.is_some()
    }

    /// Waits for queued exports to be delivered.
    ///
    /// Every clone handed out by [`Self::sink`] must already be dropped.
    pub async fn finish(self) {
        drop(self.sink);
        if let Some(worker) = self.worker {
            worker.drain().await;
        }
    }
}
