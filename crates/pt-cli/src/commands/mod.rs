//! CLI subcommand implementations.

pub mod backfill;
pub mod export;
pub mod reset;
pub mod serve;
pub mod session;
pub mod show;
pub mod status;
pub mod top;
pub mod util;
