//! NovaSweep - duplicate finder and backup manager
//!
//! Main binary entry point for the command-line interface.

use anyhow::Context as _;
use clap::Parser;
use nova_sweep::cli::{self, Cli, Commands, Context};
use nova_sweep::logging::init_logging;
use std::process::ExitCode;
use tracing::debug;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    let ctx = Context::from_cli(&cli).context("failed to load configuration")?;
    debug!("Backup store: {}", ctx.backup_root.display());

    let code = match cli.command {
        Commands::Scan(args) => cli::scan::run(args, &ctx)?,
        Commands::Backup(args) => cli::backup::run(args, &ctx)?,
        Commands::Schedule(args) => cli::schedule::run(args, &ctx)?,
        Commands::Recover(args) => cli::recover::run(args, &ctx)?,
    };
    Ok(code)
}
