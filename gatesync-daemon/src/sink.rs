//! Operator-facing messages.
//!
//! The orchestrator never writes to stdout/stderr directly. Foreground runs
//! inject a console sink (see the CLI); detached runs use [`TracingSink`],
//! which lands in the daemon log file through the subscriber.

pub trait OutputSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}
