//! Historical play time from a per-player stats directory.
//!
//! Each player has a `<uuid>.json` file shaped like:
//!
//! ```json
//! { "stats": { "minecraft:custom": { "minecraft:play_time": 72000 } } }
//! ```
//!
//! Counters are in game ticks. Older files use `minecraft:play_one_minute`
//! for the same counter (despite the name, also ticks).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::player::PlayerId;

/// Game ticks per real-time second.
pub const TICKS_PER_SECOND: u64 = 20;

const CUSTOM_CATEGORY: &str = "minecraft:custom";
const PLAY_TIME_KEYS: &[&str] = &["minecraft:play_time", "minecraft:play_one_minute"];

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("play time counter is not a non-negative integer")]
    InvalidCounter,
}

#[derive(Deserialize)]
struct StatsFile {
    #[serde(default)]
    stats: BTreeMap<String, BTreeMap<String, Value>>,
}

struct StatsEntry {
    path: PathBuf,
    player: PlayerId,
}

/// Reads play time for every player in `dir`, in whole seconds.
///
/// A missing directory yields an empty map. Only failing to list the directory
/// itself is an error. Entries that cannot be inspected, files that are not
/// named after a UUID, and files that cannot be read or parsed are skipped. A file without any
/// play-time counter counts as zero seconds.
pub fn read_stats_dir(dir: &Path) -> Result<BTreeMap<PlayerId, u64>, StatsError> {
    if !dir.is_dir() {
        return Ok(BTreeMap::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(dir = ?dir, error = %e, "skipping unreadable stats directory entry");
                continue;
            }
        };
        if !path.is_file() || !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match stem.parse::<PlayerId>() {
            Ok(player) => files.push(StatsEntry { path, player }),
            Err(_) => {
                tracing::debug!(path = ?path, "skipping stats file not named after a player id");
            }
        }
    }

    let totals = files
        .par_iter()
        .filter_map(|entry| match read_play_seconds(&entry.path) {
            Ok(secs) => Some((entry.player, secs)),
            Err(e) => {
                tracing::warn!(path = ?entry.path, error = %e, "skipping unreadable stats file");
                None
            }
        })
        .collect();

    Ok(totals)
}

/// Reads a single stats file and converts its play-time counter to seconds.
pub fn read_play_seconds(path: &Path) -> Result<u64, StatsError> {
    let reader = BufReader::new(File::open(path)?);
    let file: StatsFile = serde_json::from_reader(reader)?;
    let Some(custom) = file.stats.get(CUSTOM_CATEGORY) else {
        return Ok(0);
    };
    let Some(counter) = PLAY_TIME_KEYS.iter().find_map(|key| custom.get(*key)) else {
        return Ok(0);
    };
    let ticks = counter.as_u64().ok_or(StatsError::InvalidCounter)?;
    Ok(ticks / TICKS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALEX: &str = "ec561538-f3fd-461d-aff5-086b22154bce";
    const STEVE: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";
    const HEROBRINE: &str = "f84c6a79-0a4e-45e0-879b-cd49ebd4c4e2";

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let totals = read_stats_dir(&dir.path().join("stats")).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn converts_ticks_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &format!("{ALEX}.json"),
            r#"{"stats":{"minecraft:custom":{"minecraft:play_time":72019}}}"#,
        );
        write(
            dir.path(),
            &format!("{STEVE}.json"),
            r#"{"stats":{"minecraft:custom":{"minecraft:play_one_minute":1200}},"DataVersion":3465}"#,
        );
        write(dir.path(), &format!("{HEROBRINE}.json"), "{ not json");
        write(dir.path(), "usercache.json", "[]");
        write(dir.path(), &format!("{ALEX}.txt"), "ignored");

        let totals = read_stats_dir(dir.path()).unwrap();

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&ALEX.parse().unwrap()], 3600);
        assert_eq!(totals[&STEVE.parse().unwrap()], 60);
    }

    #[cfg(unix)]
    #[test]
    fn odd_entries_do_not_abort_the_read() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &format!("{ALEX}.json"),
            r#"{"stats":{"minecraft:custom":{"minecraft:play_time":200}}}"#,
        );
        std::fs::create_dir(dir.path().join(format!("{STEVE}.json"))).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("gone.json"),
            dir.path().join(format!("{HEROBRINE}.json")),
        )
        .unwrap();

        let totals = read_stats_dir(dir.path()).unwrap();

        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&ALEX.parse().unwrap()], 10);
    }

    #[test]
    fn prefers_play_time_over_legacy_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{ALEX}.json"));
        std::fs::write(
            &path,
            r#"{"stats":{"minecraft:custom":{"minecraft:play_one_minute":20,"minecraft:play_time":40}}}"#,
        )
        .unwrap();
        assert_eq!(read_play_seconds(&path).unwrap(), 2);
    }

    #[test]
    fn file_without_counter_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{ALEX}.json"));
        std::fs::write(&path, r#"{"stats":{"minecraft:mined":{"minecraft:stone":3}}}"#).unwrap();
        assert_eq!(read_play_seconds(&path).unwrap(), 0);
    }

    #[test]
    fn negative_counter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{ALEX}.json"));
        std::fs::write(&path, r#"{"stats":{"minecraft:custom":{"minecraft:play_time":-5}}}"#).unwrap();
        assert!(matches!(
            read_play_seconds(&path),
            Err(StatsError::InvalidCounter)
        ));
    }
}
