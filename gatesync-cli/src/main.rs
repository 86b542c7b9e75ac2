//! gatesync — keeps the Gemini CLI's MCP server list in sync with the MCP
//! gateway registry.
//!
//! # Usage
//!
//! ```text
//! gatesync [login] [--prune | --force] [--daemon-start] [--no-prompt]
//! gatesync watch [--prune | --force]
//! gatesync daemon start [--prune | --force]
//! gatesync daemon stop|status [--json]|logs [--lines N]
//! ```

mod commands;
mod context;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, login::LoginArgs, watch::WatchArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gatesync",
    version,
    about = "Sync MCP gateway registry servers into Gemini CLI settings",
    long_about = "Authenticates against the identity provider (device flow), fetches the MCP \
                  server list from the gateway registry and writes it into \
                  ~/.gemini/settings.json. Optionally keeps it fresh in the foreground or \
                  as a background process.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Options for the default `login` command.
    #[command(flatten)]
    login: LoginArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Login if needed, fetch servers and update settings (default).
    Login(LoginArgs),

    /// Keep settings in sync continuously in the foreground (Ctrl+C to stop).
    Watch(WatchArgs),

    /// Manage the background sync process.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None => cli.login.run(),
        Some(Commands::Login(args)) => args.run(),
        Some(Commands::Watch(args)) => args.run(),
        Some(Commands::Daemon { command }) => commands::daemon::run(command),
    }
}
