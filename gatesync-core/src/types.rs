//! Domain types for the credential and sync-loop state files.
//!
//! All types are serializable/deserializable via serde + serde_json. Field
//! names match the on-disk JSON written by earlier releases of the sync tool.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Seconds subtracted from a token's lifetime so it is refreshed before the
/// provider actually rejects it.
pub const EXPIRY_SAFETY_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 300;

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Token endpoint success body (`device_code` or `refresh_token` grant).
///
/// Unknown provider fields (`token_type`, `refresh_expires_in`, `scope`, …)
/// are kept in `extra` so they survive into the token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_lifetime")]
    pub expires_in: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted credential set. Superseded, never mutated, by every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    /// Unix seconds, stamped locally at persistence time.
    #[serde(default)]
    pub obtained_at: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    /// Stamp a provider grant with the local acquisition time.
    pub fn from_grant(grant: TokenGrant, obtained_at: u64) -> Self {
        let mut extra = grant.extra;
        // The provider never gets to choose our timestamp.
        extra.remove("obtained_at");
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_in: grant.expires_in,
            obtained_at,
            extra,
        }
    }

    /// Build the successor of `self` from a refresh grant. Providers that do
    /// not rotate refresh tokens omit the field; the current one is kept.
    pub fn superseded_by(&self, mut grant: TokenGrant, obtained_at: u64) -> Self {
        if grant.refresh_token.as_deref().map_or(true, str::is_empty) {
            grant.refresh_token = self.refresh_token.clone();
        }
        Self::from_grant(grant, obtained_at)
    }

    /// Unix second from which the access token is considered stale.
    pub fn stale_at(&self) -> u64 {
        self.obtained_at
            .saturating_add(self.expires_in)
            .saturating_sub(EXPIRY_SAFETY_SECS)
    }

    /// `now < obtained_at + expires_in - EXPIRY_SAFETY_SECS`.
    pub fn is_fresh_at(&self, now: u64) -> bool {
        !self.access_token.is_empty() && now < self.stale_at()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Sync loop ownership
// ---------------------------------------------------------------------------

/// How the owning sync loop was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Attached to a terminal; Ctrl+C prints a notice.
    Foreground,
    /// Detached background process; logs to file, exits silently.
    Daemon,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunMode::Foreground => "foreground",
            RunMode::Daemon => "daemon",
        };
        f.write_str(s)
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "foreground" => Ok(Self::Foreground),
            "daemon" => Ok(Self::Daemon),
            other => Err(format!(
                "unknown run mode '{other}'; expected: foreground, daemon"
            )),
        }
    }
}

/// Which process currently owns the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub mode: RunMode,
    /// Canonical path of the executable that wrote the record.
    #[serde(alias = "script")]
    pub owner_path: PathBuf,
    /// Unix seconds.
    pub started_at: u64,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One server advertised by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub path: String,
}

impl ServerEntry {
    pub fn new(display_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            path: path.into(),
        }
    }

    /// Entries without a name or path cannot be materialised.
    pub fn is_complete(&self) -> bool {
        !self.display_name.is_empty() && !self.path.is_empty()
    }

    /// Path with surrounding slashes stripped: `/search/` → `search`.
    pub fn normalized_path(&self) -> &str {
        self.path.trim_matches('/')
    }
}
