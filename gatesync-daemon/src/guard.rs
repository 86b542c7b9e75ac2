//! Advisory single-instance guard over the daemon-state file.
//!
//! At most one sync loop (foreground or detached) may run per user. The
//! owner records itself in the state file; a record whose pid is no longer
//! alive is stale and gets reclaimed. The guard is file-based and therefore
//! advisory: two processes racing through `claim` at the same instant can
//! both succeed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gatesync_core::{DaemonState, DaemonStateStore, RunMode};

use crate::error::DaemonError;
use crate::probe::ProcessControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    NotRunning,
    /// Live loop started from this installation.
    Running(DaemonState),
    /// Live loop started from a different executable path.
    ForeignOwner(DaemonState),
}

impl InstanceStatus {
    pub fn owner(&self) -> Option<&DaemonState> {
        match self {
            InstanceStatus::NotRunning => None,
            InstanceStatus::Running(state) | InstanceStatus::ForeignOwner(state) => Some(state),
        }
    }
}

#[derive(Clone)]
pub struct InstanceGuard {
    store: DaemonStateStore,
    processes: Arc<dyn ProcessControl>,
    owner_path: PathBuf,
}

impl InstanceGuard {
    /// `owner_path` identifies this installation (normally the canonical
    /// path of the running executable).
    pub fn new(
        store: DaemonStateStore,
        processes: Arc<dyn ProcessControl>,
        owner_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            processes,
            owner_path: owner_path.into(),
        }
    }

    pub fn store(&self) -> &DaemonStateStore {
        &self.store
    }

    pub fn owner_path(&self) -> &Path {
        &self.owner_path
    }

    pub fn processes(&self) -> &Arc<dyn ProcessControl> {
        &self.processes
    }

    /// Inspect the state file. Stale records are removed as a side effect.
    pub fn status(&self) -> InstanceStatus {
        let Some(state) = self.store.load() else {
            return InstanceStatus::NotRunning;
        };
        if !self.processes.is_alive(state.pid) {
            tracing::info!(pid = state.pid, mode = %state.mode, "clearing stale sync state");
            if let Err(err) = self.store.clear() {
                tracing::warn!(error = %err, "failed to clear stale sync state");
            }
            return InstanceStatus::NotRunning;
        }
        if state.owner_path != self.owner_path {
            InstanceStatus::ForeignOwner(state)
        } else {
            InstanceStatus::Running(state)
        }
    }

    /// Fail with [`DaemonError::ConcurrencyConflict`] if a live loop exists.
    pub fn ensure_available(&self) -> Result<(), DaemonError> {
        match self.status().owner() {
            Some(state) => Err(DaemonError::ConcurrencyConflict {
                pid: state.pid,
                mode: state.mode,
            }),
            None => Ok(()),
        }
    }

    /// Record this process as the loop owner. The returned claim releases
    /// the record when dropped.
    pub fn claim(&self, mode: RunMode, started_at: u64) -> Result<InstanceClaim, DaemonError> {
        self.ensure_available()?;
        let state = DaemonState {
            pid: std::process::id(),
            mode,
            owner_path: self.owner_path.clone(),
            started_at,
        };
        self.store.save(&state)?;
        tracing::debug!(pid = state.pid, %mode, "sync loop ownership claimed");
        Ok(InstanceClaim {
            store: self.store.clone(),
            pid: state.pid,
        })
    }
}

/// Ownership of the state file for the lifetime of a running loop.
#[derive(Debug)]
pub struct InstanceClaim {
    store: DaemonStateStore,
    pid: u32,
}

impl InstanceClaim {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for InstanceClaim {
    fn drop(&mut self) {
        // A record rewritten by another process after a `daemon stop` is not ours.
        if let Some(state) = self.store.load() {
            if state.pid != self.pid {
                return;
            }
        }
        match self.store.clear() {
            Ok(()) => tracing::debug!(pid = self.pid, "sync loop ownership released"),
            Err(err) => tracing::warn!(error = %err, "failed to clear sync state"),
        }
    }
}
