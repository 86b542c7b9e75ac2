//! # gatesync-settings
//!
//! Materialises the registry's server list into the consumer settings file.
//!
//! Only the `mcpServers` mapping is touched, and inside it only entries whose
//! URL points at the registry ("managed" entries) are ever pruned. Call
//! [`SettingsFile::apply`] to merge and write, or [`merge_servers`] to work on
//! an in-memory section.

pub mod error;
pub mod merge;
pub mod writer;

pub use error::SettingsError;
pub use merge::{is_managed, merge_servers, server_url, MergeMode, MergeReport, MANAGED_SECTION};
pub use writer::{SettingsFile, SettingsUpdate, WriteResult};
