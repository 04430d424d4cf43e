//! Playtime ledger CLI library.
//!
//! This crate provides the `pt` command line and the stdin bridge used by
//! game server hosts.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{AutoExportSettings, Config};
