//! Cooperative cancellation for the device-flow poll and the sync loop.
//!
//! Every wait goes through [`Shutdown::sleep`], which returns early with
//! [`Wait::Cancelled`] once [`Shutdown::trigger`] has been called (by the
//! signal listener or a test). Phases check [`Shutdown::is_triggered`]
//! between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is (or becomes) triggered.
    pub async fn sleep(&self, duration: Duration) -> Wait {
        let mut rx = self.tx.subscribe();
        if self.is_triggered() {
            return Wait::Cancelled;
        }
        tokio::select! {
            _ = rx.recv() => Wait::Cancelled,
            _ = tokio::time::sleep(duration) => Wait::Elapsed,
        }
    }

    /// Trigger on Ctrl+C, and on SIGTERM/SIGINT under POSIX.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let mut rx = shutdown.tx.subscribe();
            tokio::select! {
                _ = rx.recv() => {}
                name = wait_for_signal() => {
                    tracing::info!(signal = name, "received signal, shutting down sync");
                    shutdown.trigger();
                }
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(err), _) | (_, Err(err)) => {
            tracing::warn!(error = %err, "cannot install POSIX signal handlers; using ctrl-c only");
            return match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(_) => std::future::pending().await,
            };
        }
    };
    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(err) => {
            tracing::warn!(error = %err, "ctrl-c handler failed");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn sleep_elapses_without_trigger() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.sleep(Duration::from_secs(240)).await, Wait::Elapsed);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn trigger_interrupts_pending_sleep() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });

        let started = tokio::time::Instant::now();
        assert_eq!(shutdown.sleep(Duration::from_secs(3600)).await, Wait::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn sleep_after_trigger_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.sleep(Duration::from_secs(3600)).await, Wait::Cancelled);
    }
}
