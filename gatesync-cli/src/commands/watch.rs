//! `gatesync watch` — the continuous loop, foreground or detached.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use gatesync_core::RunMode;
use gatesync_daemon::log_rotation::{open_sync_log, LogRotation};
use gatesync_daemon::{OutputSink, Shutdown, TracingSink};

use crate::commands::MergeArgs;
use crate::context::{self, notice, AppContext, ConsoleSink};

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub merge: MergeArgs,

    /// Set by `daemon start` on the spawned process: log to the sync log
    /// file and exit silently when stopped.
    #[arg(long, hide = true)]
    pub detached: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let ctx = AppContext::load()?;
        let (run_mode, sink): (RunMode, Arc<dyn OutputSink>) = if self.detached {
            let log = open_sync_log(&ctx.paths.log, LogRotation::default())?;
            context::init_file_tracing(log);
            tracing::info!(pid = std::process::id(), "background sync process started");
            (RunMode::Daemon, Arc::new(TracingSink))
        } else {
            context::init_console_tracing();
            (RunMode::Foreground, Arc::new(ConsoleSink))
        };

        let outcome = run_loop(&ctx, self.merge, run_mode, sink);
        if let (Err(err), RunMode::Daemon) = (&outcome, run_mode) {
            tracing::error!("background sync exited: {err:#}");
        }
        outcome
    }
}

fn run_loop(
    ctx: &AppContext,
    merge: MergeArgs,
    run_mode: RunMode,
    sink: Arc<dyn OutputSink>,
) -> Result<()> {
    let config = context::load_config()?;
    let mode = merge.mode()?;
    if run_mode == RunMode::Foreground {
        notice("Starting foreground continuous sync (Ctrl+C to stop)...");
        notice(format!("Options: prune={}, force={}", merge.prune, merge.force));
    }

    let orchestrator = ctx.orchestrator(&config, sink);
    let shutdown = Shutdown::new();
    let result = context::block_on(async {
        let listener = shutdown.listen_for_signals();
        let result = orchestrator.run_watch(mode, run_mode, &shutdown).await;
        listener.abort();
        result
    })?;
    result.context("sync loop stopped with an error")?;

    if run_mode == RunMode::Foreground && shutdown.is_triggered() {
        notice("Sync stopped by user (Ctrl+C)");
    }
    Ok(())
}
