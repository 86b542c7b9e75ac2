pub mod daemon;
pub mod login;
pub mod watch;

use std::ffi::OsString;

use anyhow::Result;
use clap::Args;

use gatesync_settings::MergeMode;

/// `--prune` / `--force`, shared by every command that merges settings.
#[derive(Args, Debug, Default, Clone, Copy)]
pub struct MergeArgs {
    /// Remove registry-managed servers that are no longer in the registry.
    /// Servers not managed by the registry are left alone.
    #[arg(long, conflicts_with = "force")]
    pub prune: bool,

    /// Replace the entire mcpServers block with the registry's servers
    /// (destructive: removes servers not managed by the registry).
    #[arg(long)]
    pub force: bool,
}

impl MergeArgs {
    pub fn mode(&self) -> Result<MergeMode> {
        Ok(MergeMode::from_flags(self.prune, self.force)?)
    }

    /// The same flags, for a spawned `watch --detached` child.
    pub fn forward(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if self.prune {
            args.push("--prune".into());
        }
        if self.force {
            args.push("--force".into());
        }
        args
    }
}
