//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use pt_sink::{InfluxSettings, SessionExportSettings};
use pt_store::{BACKFILL_MARKER_FILE, BackfillOptions, DEFAULT_CHECKPOINT_INTERVAL, LEDGER_FILE};
use serde::{Deserialize, Serialize};

const MIN_AUTO_EXPORT_MINUTES: u64 = 1;
const MAX_AUTO_EXPORT_MINUTES: u64 = 1440;

/// Periodic totals export while serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoExportSettings {
    pub enabled: bool,
    pub minutes: u64,
}

impl Default for AutoExportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            minutes: 5,
        }
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the ledger snapshot, backfill marker and lock file.
    pub data_dir: PathBuf,
    pub checkpoint_interval_secs: u64,
    pub influx: InfluxSettings,
    pub sessions: SessionExportSettings,
    pub auto_export: AutoExportSettings,
    pub backfill: BackfillOptions,
}

// InfluxSettings redacts its own token.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("checkpoint_interval_secs", &self.checkpoint_interval_secs)
            .field("influx", &self.influx)
            .field("sessions", &self.sessions)
            .field("auto_export", &self.auto_export)
            .field("backfill", &self.backfill)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs_data_path().unwrap_or_else(|| PathBuf::from(".")),
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL.as_secs(),
            influx: InfluxSettings::default(),
            sessions: SessionExportSettings::default(),
            auto_export: AutoExportSettings::default(),
            backfill: BackfillOptions::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(dirs_config_path().as_deref(), config_path).extract()
    }

    /// Defaults, then the user config file, then `config_path`, then `PT_*`
    /// environment variables. Nested keys use `__`, as in `PT_INFLUX__TOKEN`.
    fn figment(config_dir: Option<&Path>, config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = config_dir {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed("PT_").split("__"))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.data_dir.join(BACKFILL_MARKER_FILE)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// The auto-export period, clamped to between one minute and one day.
    pub fn auto_export_interval(&self) -> Option<Duration> {
        self.auto_export.enabled.then(|| {
            let minutes = self
                .auto_export
                .minutes
                .clamp(MIN_AUTO_EXPORT_MINUTES, MAX_AUTO_EXPORT_MINUTES);
            Duration::from_secs(minutes * 60)
        })
    }
}

/// Returns the platform-specific config directory for pt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pt"))
}

/// Returns the platform-specific data directory for pt.
///
/// On Linux: `~/.local/share/pt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pt"))
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pt_store::BackfillSource;

    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_pt() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "pt");
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(30));
        assert_eq!(config.influx.bucket, "playtime");
        assert_eq!(config.sessions.event_measurement, "player_session_event");
        assert!(config.backfill.only_once);
        assert_eq!(config.auto_export_interval(), None);
        assert_eq!(config.ledger_path(), config.data_dir.join("playtime-ledger.json"));
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pt.toml",
                r#"
                data_dir = "/srv/pt"
                checkpoint_interval_secs = 10

                [influx]
                enabled = true
                token = "from-file"
                server_tag = "survival"

                [backfill]
                enabled = true
                source = "stats"
                stats_dir = "/srv/world/stats"
                "#,
            )?;
            jail.set_env("PT_INFLUX__TOKEN", "from-env");
            jail.set_env("PT_AUTO_EXPORT__ENABLED", "true");

            let config: Config = Config::figment(None, Some(Path::new("pt.toml"))).extract()?;

            assert_eq!(config.data_dir, PathBuf::from("/srv/pt"));
            assert_eq!(config.checkpoint_interval_secs, 10);
            assert!(config.influx.enabled);
            assert_eq!(config.influx.token, "from-env");
            assert_eq!(config.influx.org, "minecraft");
            assert_eq!(config.backfill.source, BackfillSource::Stats);
            assert_eq!(
                config.backfill.stats_dir.as_deref(),
                Some(Path::new("/srv/world/stats"))
            );
            assert_eq!(config.auto_export_interval(), Some(Duration::from_secs(300)));
            Ok(())
        });
    }

    #[test]
    fn test_auto_export_minutes_clamped() {
        let mut config = Config::default();
        config.auto_export.enabled = true;

        config.auto_export.minutes = 0;
        assert_eq!(config.auto_export_interval(), Some(Duration::from_secs(60)));

        config.auto_export.minutes = 10_000;
        assert_eq!(
            config.auto_export_interval(),
            Some(Duration::from_secs(1440 * 60))
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = Config::default();
        config.influx.token = "super-secret".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
    }
}
