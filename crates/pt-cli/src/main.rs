use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pt_cli::commands::session::Action;
use pt_cli::commands::{backfill, export, reset, serve, session, show, status, top};
use pt_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let now = Utc::now();

    match command {
        Commands::Top { limit, json } => top::run(&mut out, &config, *limit, *json, now)?,
        Commands::Show { player } => show::run(&mut out, &config, player, now)?,
        Commands::Export => export::run(&mut out, &config, now)?,
        Commands::Reset => reset::run(&mut out, &config)?,
        Commands::Login { player, name } => {
            session::run(&mut out, &config, Action::Login, player, name.as_deref(), now)?;
        }
        Commands::Logout { player, name } => {
            session::run(&mut out, &config, Action::Logout, player, name.as_deref(), now)?;
        }
        Commands::Backfill { force } => backfill::run(&mut out, &config, *force, now)?,
        Commands::Status => status::run(&mut out, &config)?,
        Commands::Serve => serve::run(&config)?,
    }

    out.flush()?;
    Ok(())
}
