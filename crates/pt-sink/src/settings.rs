use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The configured InfluxDB URL cannot be used as a write endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid influx url {url:?}: {reason}")]
pub struct InvalidUrl {
    pub url: String,
    pub reason: String,
}

/// Connection and naming settings for the InfluxDB v2 write API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSettings {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Measurement for totals snapshots.
    pub measurement: String,
    /// Value of the `server` tag. Omitted when empty.
    pub server_tag: String,
    /// Skip TLS certificate and hostname verification.
    pub accept_invalid_certs: bool,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: "minecraft".to_string(),
            bucket: "playtime".to_string(),
            measurement: "player_playtime".to_string(),
            server_tag: String::new(),
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("measurement", &self.measurement)
            .field("server_tag", &self.server_tag)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl InfluxSettings {
    /// The write endpoint with org, bucket and precision in the query string.
    ///
    /// A path on the base URL is kept as a prefix, for servers behind a
    /// reverse proxy.
    pub fn write_url(&self) -> Result<Url, InvalidUrl> {
        let invalid = |reason: String| InvalidUrl {
            url: self.url.clone(),
            reason,
        };
        let mut base = Url::parse(self.url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", base.scheme())));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut url = base
            .join("api/v2/write")
            .map_err(|e| invalid(e.to_string()))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("org", &self.org)
            .append_pair("bucket", &self.bucket)
            .append_pair("precision", "ns");
        Ok(url)
    }
}

/// Per-session export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionExportSettings {
    pub enabled: bool,
    /// Measurement for one-per-session summaries.
    pub measurement: String,
    /// Measurement for join and leave events.
    pub event_measurement: String,
    pub include_name_tag: bool,
}

impl Default for SessionExportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            measurement: "player_session".to_string(),
            event_measurement: "player_session_event".to_string(),
            include_name_tag: true,
        }
    }
}
