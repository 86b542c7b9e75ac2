//! gatesync core library — domain types, configuration, path layout and
//! atomic persistence of the token and daemon-state files.
//!
//! - [`types`] — token, daemon-state and registry records
//! - [`config`] — [`SyncConfig`], built once from the environment
//! - [`paths`] — [`GatewayPaths`] under `~/.gemini/`
//! - [`store`] — [`TokenStore`] / [`DaemonStateStore`] with all-or-nothing writes
//! - [`clock`] — wall-clock seam used for `obtained_at` and freshness checks

pub mod clock;
pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use error::{ConfigError, StoreError};
pub use paths::GatewayPaths;
pub use store::{DaemonStateStore, TokenStore};
pub use types::{
    DaemonState, RunMode, ServerEntry, TokenGrant, TokenRecord, DEFAULT_TOKEN_LIFETIME_SECS,
    EXPIRY_SAFETY_SECS,
};
