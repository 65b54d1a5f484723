//! Schedule command: run periodic backups in the foreground.

use super::Context;
use crate::scheduling::Scheduler;
use crate::Result;
use clap::Args;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Arguments for the schedule command
#[derive(Args)]
pub struct ScheduleArgs {
    /// File or directory to include (repeatable)
    #[arg(long, short, required = true)]
    pub source: Vec<PathBuf>,

    /// Hours between backups (default: from configuration)
    #[arg(long)]
    pub every_hours: Option<u64>,
}

/// Start the scheduler and stop it on end of input or a `quit` line
pub fn run(args: ScheduleArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.config.backup.clone();
    if let Some(hours) = args.every_hours {
        config.backup_interval_secs = hours.saturating_mul(3600);
    }

    let manager = Arc::new(ctx.backup_manager()?);
    let scheduler = Scheduler::new(manager, &config);
    scheduler.start(args.source)?;

    if let Some(next) = scheduler.next_run() {
        println!("Next backup at {}", next.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("Type 'quit' or close input to stop.");

    for line in io::stdin().lock().lines() {
        if line?.trim().eq_ignore_ascii_case("quit") {
            break;
        }
    }

    scheduler.stop();
    println!("Scheduler stopped.");
    Ok(ExitCode::SUCCESS)
}
