//! Error types for gatesync-settings.

use std::path::PathBuf;

use thiserror::Error;

use gatesync_core::StoreError;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to replace settings file: {0}")]
    Store(#[from] StoreError),

    /// `--prune` and `--force` describe incompatible merges.
    #[error("--prune and --force are mutually exclusive")]
    ConflictingModes,
}

/// Convenience constructor for [`SettingsError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.into(),
        source,
    }
}
