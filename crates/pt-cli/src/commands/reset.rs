use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;

use super::util;

/// Zeroes every total and drops open sessions. Cached names are kept.
pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let _lock = util::lock_data_dir(config)?;
    let store = util::open_ledger(config);
    let players = store.snapshot().totals().len();

    store
        .reset()
        .with_context(|| format!("failed to save {}", store.path().display()))?;
    tracing::info!(players, "ledger reset");

    writeln!(writer, "Reset playtime for {players} players.")?;
    Ok(())
}
