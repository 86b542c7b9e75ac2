//! `gatesync login` — the default command.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use gatesync_daemon::{InstanceStatus, Shutdown};
use gatesync_settings::MergeMode;

use crate::commands::{daemon, MergeArgs};
use crate::context::{self, notice, warning, AppContext, ConsoleSink};

#[derive(Args, Debug, Default)]
pub struct LoginArgs {
    #[command(flatten)]
    pub merge: MergeArgs,

    /// Start background sync after updating settings.
    #[arg(long)]
    pub daemon_start: bool,

    /// Do not offer to start background sync.
    #[arg(long)]
    pub no_prompt: bool,
}

impl LoginArgs {
    pub fn run(self) -> Result<()> {
        context::init_console_tracing();
        let config = context::load_config()?;
        let mode = self.merge.mode()?;
        let ctx = AppContext::load()?;

        if mode == MergeMode::Force {
            warning("--force is set: this will replace the entire mcpServers block in settings.json.");
        }

        let orchestrator = ctx.orchestrator(&config, Arc::new(ConsoleSink));
        let result = context::block_on(async {
            let shutdown = Shutdown::new();
            let listener = shutdown.listen_for_signals();
            let result = orchestrator.run_once(mode, &shutdown).await;
            listener.abort();
            result
        })?;
        let report = result.context("sync failed")?;
        tracing::debug!(servers = report.servers.len(), "login sync complete");

        if self.daemon_start {
            daemon::start(&ctx, self.merge)?;
        } else if !self.no_prompt {
            match ctx.lifecycle().status() {
                InstanceStatus::Running(state) | InstanceStatus::ForeignOwner(state) => notice(format!(
                    "Background sync is already active (PID {}, mode={}).",
                    state.pid, state.mode
                )),
                InstanceStatus::NotRunning if io::stdin().is_terminal() => {
                    offer_background_sync(ctx, self.merge)?;
                }
                InstanceStatus::NotRunning => {}
            }
        }

        notice("Done.");
        Ok(())
    }
}

/// Ask, then start the daemon on "y". Ctrl+C anywhere in here (including
/// the start confirmation wait) cancels just this step.
fn offer_background_sync(ctx: AppContext, merge: MergeArgs) -> Result<()> {
    let outcome = context::interruptible(move || -> Result<()> {
        if confirm("Start background sync for this session now? (y/N): ")? {
            daemon::start(&ctx, merge)
        } else {
            notice("Background sync not started.");
            Ok(())
        }
    })?;
    match outcome {
        Some(result) => result,
        None => {
            println!();
            notice("Operation cancelled.");
            Ok(())
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question}");
    io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read answer from stdin")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
