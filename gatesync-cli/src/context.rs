//! Process-wide wiring: paths, configuration, logging, runtime and the
//! components built from them.

use std::fs::File;
use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use colored::Colorize;

use gatesync_client::UreqTransport;
use gatesync_core::config::HTTP_TIMEOUT;
use gatesync_core::{DaemonStateStore, GatewayPaths, SyncConfig};
use gatesync_daemon::lifecycle::current_owner_path;
use gatesync_daemon::{
    InstanceGuard, LifecycleManager, OutputSink, SyncOrchestrator, SystemProcesses,
};

pub struct AppContext {
    pub paths: GatewayPaths,
    guard: InstanceGuard,
}

impl AppContext {
    /// Paths and loop ownership; enough for the `daemon` subcommands that
    /// never talk to the network.
    pub fn load() -> Result<Self> {
        let paths = GatewayPaths::from_home()?;
        paths
            .ensure_layout()
            .with_context(|| format!("failed to prepare {}", paths.config_dir.display()))?;
        let owner = current_owner_path()?;
        let guard = InstanceGuard::new(
            DaemonStateStore::new(&paths.state),
            Arc::new(SystemProcesses),
            owner,
        );
        Ok(Self { paths, guard })
    }

    pub fn lifecycle(&self) -> LifecycleManager {
        LifecycleManager::new(self.guard.clone())
    }

    /// Orchestrator against the real identity provider and registry.
    pub fn orchestrator(&self, config: &SyncConfig, sink: Arc<dyn OutputSink>) -> SyncOrchestrator {
        let transport = Arc::new(UreqTransport::new(HTTP_TIMEOUT));
        SyncOrchestrator::new(config, &self.paths, transport, self.guard.clone()).with_sink(sink)
    }
}

/// Configuration from the environment; fatal before any work starts.
pub fn load_config() -> Result<SyncConfig> {
    Ok(SyncConfig::from_env()?)
}

pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    Ok(runtime()?.block_on(future))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Run blocking, possibly interactive `work` on its own thread; `None` when
/// Ctrl+C arrives first.
///
/// Once a sync run has installed signal handlers the default SIGINT action is
/// gone for the rest of the process, so anything that waits on the operator
/// afterwards must listen for Ctrl+C itself. An interrupted worker is left
/// blocked (typically on stdin) and dies with the process.
pub fn interruptible<T, W>(work: W) -> Result<Option<T>>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
{
    interruptible_until(work, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
}

fn interruptible_until<T, W, C>(work: W, cancel: C) -> Result<Option<T>>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
    C: Future<Output = ()>,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::Builder::new()
        .name("gatesync-prompt".into())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .context("failed to start prompt thread")?;

    runtime()?.block_on(async {
        tokio::select! {
            done = rx => done.map(Some).context("prompt thread exited without an answer"),
            _ = cancel => Ok(None),
        }
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Operator messages on the terminal.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn info(&self, message: &str) {
        println!("{} {message}", "[*]".green());
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {message}", "[!]".yellow());
    }
}

pub fn notice(message: impl AsRef<str>) {
    ConsoleSink.info(message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    ConsoleSink.warn(message.as_ref());
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Interactive runs: library diagnostics on stderr, warnings and up unless
/// `RUST_LOG` says otherwise. User-facing progress goes through
/// [`ConsoleSink`].
pub fn init_console_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Detached runs: everything at `info` into the sync log.
pub fn init_file_tracing(log: File) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log))
        .try_init();
}
