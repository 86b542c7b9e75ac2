//! Error types for gatesync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "HORIZON_DOMAIN environment variable not set (example: export HORIZON_DOMAIN=myenv.horizon-sdv.com)"
    )]
    MissingBaseDomain,

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.gemini/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Errors from the on-disk token / state / settings files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure on the write path.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file exists but does not hold a valid record. Callers of `load`
    /// never see this; it is folded into "absent".
    #[error("unreadable state at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience constructor for [`StoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
