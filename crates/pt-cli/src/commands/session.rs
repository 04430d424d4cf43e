//! One-shot `pt login` and `pt logout`.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pt_core::{LogoutOutcome, totals};
use pt_store::SessionTracker;

use crate::Config;

use super::util::{self, ExportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Logout,
}

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    action: Action,
    player: &str,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let player = util::parse_player(player)?;
    let _lock = util::lock_data_dir(config)?;

    let runtime = util::oneshot_runtime()?;
    let export = ExportSink::start(config, runtime.handle())?;
    let store = Arc::new(util::open_ledger(config));
    let tracker = SessionTracker::new(Arc::clone(&store), export.sink(), config.sessions.enabled);

    let message = match action {
        Action::Login => {
            tracker.login(player, name, now);
            let display = totals::display_name(&store.snapshot(), &player);
            format!("{display} logged in.")
        }
        Action::Logout => {
            let outcome = tracker.logout(player, name, now);
            let display = totals::display_name(&store.snapshot(), &player);
            match outcome {
                LogoutOutcome::Closed(session) => format!(
                    "{display} logged out after {}.",
                    totals::format_duration(session.seconds)
                ),
                LogoutOutcome::NoActiveSession => format!("{display} had no open session."),
            }
        }
    };

    drop(tracker);
    runtime.block_on(export.finish());
    writeln!(writer, "{message}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    const ALEX: &str = "ec561538-f3fd-461d-aff5-086b22154bce";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn run_to_string(config: &Config, action: Action, now: DateTime<Utc>) -> String {
        let mut output = Vec::new();
        run(&mut output, config, action, ALEX, Some("Alex"), now).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn login_then_logout_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        assert_eq!(run_to_string(&config, Action::Login, t0()), "Alex logged in.\n");
        assert_eq!(
            run_to_string(&config, Action::Logout, t0() + Duration::seconds(125)),
            "Alex logged out after 0d 0h 2m.\n"
        );
        assert_eq!(
            run_to_string(&config, Action::Logout, t0() + Duration::seconds(200)),
            "Alex had no open session.\n"
        );

        let ledger = util::open_ledger(&config).snapshot();
        assert_eq!(ledger.closed_total(&ALEX.parse().unwrap()), 125);
    }

    #[test]
    fn rejects_non_uuid_player() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let err = run(&mut Vec::new(), &config, Action::Login, "Alex", None, t0()).unwrap_err();
        assert!(err.to_string().contains("UUID"));
    }
}
