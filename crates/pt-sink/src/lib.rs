//! InfluxDB export for the playtime ledger.
//!
//! [`InfluxSink`] implements [`MetricsSink`] by encoding each notification as
//! line protocol and queueing it for a background worker, which posts it to
//! the InfluxDB v2 write API.
//!
//! # Delivery
//!
//! Publishing never blocks: a full queue rejects the notification with
//! [`SinkError::QueueFull`]. The worker makes one attempt per body and logs
//! failures, so delivery is at most once. [`MetricsSink::deliver_totals`]
//! additionally reports that attempt's result back to the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pt_core::{Delivery, MetricsSink, PlayerId, SessionEvent, SessionSummary, SinkError};
use reqwest::Url;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub mod line_protocol;
mod settings;

pub use settings::{InfluxSettings, InvalidUrl, SessionExportSettings};

/// Bodies that may wait for the worker before publishing starts failing.
pub const QUEUE_CAPACITY: usize = 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum InfluxError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrl),
}

/// One line-protocol body, optionally with someone waiting on its result.
struct Batch {
    body: String,
    ack: Option<oneshot::Sender<Result<(), SinkError>>>,
}

/// Queueing [`MetricsSink`] backed by InfluxDB.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    tx: mpsc::Sender<Batch>,
    influx: InfluxSettings,
    sessions: SessionExportSettings,
}

/// Handle to the background writer.
#[derive(Debug)]
pub struct SinkWorker {
    handle: JoinHandle<()>,
}

impl SinkWorker {
    /// Waits for the worker to post everything still queued.
    ///
    /// Completes once every [`InfluxSink`] clone has been dropped.
    pub async fn drain(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "influx worker panicked");
        }
    }
}

impl InfluxSink {
    /// Builds the HTTP client and starts the worker on `runtime`.
    ///
    /// Fails without spawning anything if the configured URL is unusable.
    pub fn spawn(
        influx: InfluxSettings,
        sessions: SessionExportSettings,
        runtime: &Handle,
    ) -> Result<(Self, SinkWorker), InfluxError> {
        Self::spawn_with_capacity(influx, sessions, runtime, QUEUE_CAPACITY)
    }

    fn spawn_with_capacity(
        influx: InfluxSettings,
        sessions: SessionExportSettings,
        runtime: &Handle,
        capacity: usize,
    ) -> Result<(Self, SinkWorker), InfluxError> {
        let url = influx.write_url()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(influx.accept_invalid_certs)
            .build()
            .map_err(InfluxError::ClientBuild)?;
        if influx.accept_invalid_certs {
            tracing::warn!(url = %influx.url, "TLS certificate verification disabled for influx");
        }

        let (tx, rx) = mpsc::channel(capacity);
        let writer = Writer {
            http,
            url,
            token: influx.token.clone(),
        };
        let handle = runtime.spawn(writer.run(rx));

        Ok((
            Self {
                tx,
                influx,
                sessions,
            },
            SinkWorker { handle },
        ))
    }

    fn enqueue(&self, body: String) -> Result<(), SinkError> {
        self.send(Batch { body, ack: None })
    }

    fn send(&self, batch: Batch) -> Result<(), SinkError> {
        self.tx.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl MetricsSink for InfluxSink {
    fn publish_totals(
        &self,
        totals: &BTreeMap<PlayerId, u64>,
        at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        if totals.is_empty() {
            return Ok(());
        }
        self.enqueue(line_protocol::totals_lines(&self.influx, totals, at))
    }

    fn deliver_totals(&self, totals: &BTreeMap<PlayerId, u64>, at: DateTime<Utc>) -> Delivery {
        if totals.is_empty() {
            return Box::pin(std::future::ready(Ok(())));
        }
        let (ack, result) = oneshot::channel();
        let batch = Batch {
            body: line_protocol::totals_lines(&self.influx, totals, at),
            ack: Some(ack),
        };
        if let Err(e) = self.send(batch) {
            return Box::pin(std::future::ready(Err(e)));
        }
        Box::pin(async move { result.await.unwrap_or(Err(SinkError::Closed)) })
    }

    fn publish_session_event(&self, event: SessionEvent) -> Result<(), SinkError> {
        if !self.sessions.enabled {
            return Err(SinkError::Disabled);
        }
        self.enqueue(line_protocol::event_line(&self.influx, &self.sessions, &event))
    }

    fn publish_session_summary(&self, summary: SessionSummary) -> Result<(), SinkError> {
        if !self.sessions.enabled {
            return Err(SinkError::Disabled);
        }
        let body = line_protocol::summary_line(&self.influx, &self.sessions, &summary);
        tracing::debug!(body = %body, "queueing session summary");
        self.enqueue(body)
    }
}

struct Writer {
    http: reqwest::Client,
    url: Url,
    token: String,
}

impl Writer {
    async fn run(self, mut rx: mpsc::Receiver<Batch>) {
        tracing::debug!("influx worker started");
        while let Some(Batch { body, ack }) = rx.recv().await {
            let result = self.post(body).await;
            if let Some(ack) = ack {
                let _ = ack.send(result);
            }
        }
        tracing::debug!("influx worker stopped");
    }

    async fn post(&self, body: String) -> Result<(), SinkError> {
        let lines = body.lines().count();
        let response = self
            .http
            .post(self.url.clone())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(lines, "influx write accepted");
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                tracing::warn!(%status, lines, body = %detail, "influx write rejected");
                Err(SinkError::Delivery(format!("influx responded {status}")))
            }
            Err(e) => {
                tracing::warn!(error = %e, lines, "influx write failed");
                Err(SinkError::Delivery(e.to_string()))
            }
        }
    }
}
