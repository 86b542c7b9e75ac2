//! On-disk layout.
//!
//! ```text
//! ~/.gemini/
//!   settings.json                       (consumer settings; we own `mcpServers`)
//!   mcp-gateway-registry-token.json     (TokenRecord — mode 0600)
//!   mcp-gateway-sync-state.json         (DaemonState — mode 0600)
//!   mcp-gateway-sync.log                (detached loop log, rotated)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError, StoreError};

pub const CONFIG_DIR: &str = ".gemini";
pub const SETTINGS_FILE: &str = "settings.json";
pub const TOKEN_FILE: &str = "mcp-gateway-registry-token.json";
pub const STATE_FILE: &str = "mcp-gateway-sync-state.json";
pub const LOG_FILE: &str = "mcp-gateway-sync.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPaths {
    pub config_dir: PathBuf,
    pub settings: PathBuf,
    pub token: PathBuf,
    pub state: PathBuf,
    pub log: PathBuf,
}

impl GatewayPaths {
    /// Layout rooted at an explicit home directory; used by tests.
    pub fn at(home: &Path) -> Self {
        let config_dir = home.join(CONFIG_DIR);
        Self {
            settings: config_dir.join(SETTINGS_FILE),
            token: config_dir.join(TOKEN_FILE),
            state: config_dir.join(STATE_FILE),
            log: config_dir.join(LOG_FILE),
            config_dir,
        }
    }

    /// Layout rooted at `dirs::home_dir()`.
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(Self::at(&home))
    }

    /// Create the config directory and an empty `{}` settings file if missing.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).map_err(|e| io_err(&self.config_dir, e))?;
        }
        if !self.settings.exists() {
            fs::write(&self.settings, "{}\n").map_err(|e| io_err(&self.settings, e))?;
        }
        Ok(())
    }
}
