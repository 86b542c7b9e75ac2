//! `gatesync daemon` — background sync lifecycle and logs.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::json;

use gatesync_core::DaemonState;
use gatesync_daemon::lifecycle::START_CONFIRM_TIMEOUT;
use gatesync_daemon::{InstanceStatus, StopOutcome};

use crate::commands::MergeArgs;
use crate::context::{self, notice, warning, AppContext};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start continuous sync as a detached background process.
    Start(MergeArgs),
    /// Stop the running sync loop (background or foreground).
    Stop,
    /// Show whether a sync loop is running.
    Status(DaemonStatusArgs),
    /// Print recent lines of the background sync log.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonStatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    context::init_console_tracing();
    let ctx = AppContext::load()?;

    match command {
        DaemonCommand::Start(merge) => {
            // The child needs the same configuration; fail here, not in its log.
            context::load_config()?;
            merge.mode()?;
            start(&ctx, merge)?;
        }
        DaemonCommand::Stop => {
            let outcome = context::block_on(ctx.lifecycle().stop())?
                .context("failed to stop sync")?;
            match outcome {
                StopOutcome::NotRunning => notice("Sync is not running."),
                StopOutcome::Stale { pid } => {
                    notice(format!("Sync is not running (stale PID {pid}). Cleaned state."))
                }
                StopOutcome::Stopped { pid, mode, forced } => {
                    notice(format!("Stopped sync (mode={mode}, PID {pid})."));
                    if forced {
                        warning("Process ignored the termination request and was killed.");
                    }
                }
            }
        }
        DaemonCommand::Status(args) => {
            let status = ctx.lifecycle().status();
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status_json(&status))
                        .context("failed to render sync status JSON")?
                );
            } else {
                print_status(&status);
            }
        }
        DaemonCommand::Logs(args) => {
            print_tail(&ctx.paths.log, args.lines).context("failed to read sync log")?;
        }
    }

    Ok(())
}

/// Launch `gatesync watch --detached` and wait for it to claim the loop.
pub fn start(ctx: &AppContext, merge: MergeArgs) -> Result<()> {
    let program = std::env::current_exe().context("cannot locate the gatesync executable")?;
    let mut args = vec!["watch".into(), "--detached".into()];
    args.extend(merge.forward());

    let outcome = context::block_on(ctx.lifecycle().start(&program, &args))?
        .context("failed to start background sync")?;
    notice(format!(
        "Started background sync (initial PID {}).",
        outcome.launcher_pid
    ));
    match outcome.confirmed {
        Some(state) => notice(format!("Daemon confirmed running (PID {}).", state.pid)),
        None => {
            warning(format!(
                "Could not confirm daemon started within {}s.",
                START_CONFIRM_TIMEOUT.as_secs()
            ));
            warning(format!("Check {} for errors.", ctx.paths.log.display()));
        }
    }
    Ok(())
}

fn print_status(status: &InstanceStatus) {
    match status {
        InstanceStatus::NotRunning => println!("{} Sync is not running.", "■".bright_black()),
        InstanceStatus::Running(state) => println!(
            "{} Sync is running (mode={}, PID {}, since {}).",
            "■".green().bold(),
            state.mode,
            state.pid,
            started_at(state)
        ),
        InstanceStatus::ForeignOwner(state) => {
            println!(
                "{} Sync is running, owned by another installation (mode={}, PID {}, since {}).",
                "■".yellow().bold(),
                state.mode,
                state.pid,
                started_at(state)
            );
            println!("  owner: {}", state.owner_path.display());
        }
    }
}

fn status_json(status: &InstanceStatus) -> serde_json::Value {
    match status.owner() {
        None => json!({ "running": false }),
        Some(state) => json!({
            "running": true,
            "pid": state.pid,
            "mode": state.mode,
            "owner": state.owner_path,
            "started_at": state.started_at,
            "foreign": matches!(status, InstanceStatus::ForeignOwner(_)),
        }),
    }
}

fn started_at(state: &DaemonState) -> String {
    i64::try_from(state.started_at)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| state.started_at.to_string())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
