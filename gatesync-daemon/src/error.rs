use std::path::PathBuf;

use thiserror::Error;

use gatesync_client::ApiError;
use gatesync_core::{ConfigError, RunMode, StoreError};
use gatesync_settings::SettingsError;

/// Error surface for the sync loop, its guard and process lifecycle.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Another process already owns the sync loop.
    #[error(
        "sync is already running (mode={mode}, PID {pid}); stop it first with `gatesync daemon stop`"
    )]
    ConcurrencyConflict { pid: u32, mode: RunMode },

    #[error("no servers returned from the MCP registry")]
    NoServers,

    #[error("authentication failed after token refresh; run `gatesync login` to re-authenticate")]
    ReauthRequired,

    #[error("no usable session (token file missing or without refresh token); run `gatesync login` first")]
    NoSession,

    #[error("interrupted")]
    Cancelled,

    #[error("{task} task join failure: {detail}")]
    Join { task: &'static str, detail: String },
}

impl DaemonError {
    /// Network-level failure the continuous loop may sit out.
    pub fn is_transient(&self) -> bool {
        matches!(self, DaemonError::Api(err) if err.is_transient())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
