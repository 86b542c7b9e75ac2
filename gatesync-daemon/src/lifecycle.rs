//! Detached sync process: start, confirm, stop, status.
//!
//! ## Start
//!
//! 1. Refuse if a live loop already owns the state file.
//! 2. Spawn the same executable in detached watch mode, stdio to null.
//! 3. Poll the state file until the child records itself. The launcher pid
//!    is only reported; ownership is whatever the child wrote.
//!
//! ## Stop
//!
//! Terminate the recorded owner, wait a grace period, kill it if it is still
//! alive (POSIX), then clear the state file regardless of the outcome.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use gatesync_core::{DaemonState, RunMode};

use crate::error::{io_err, DaemonError};
use crate::guard::{InstanceGuard, InstanceStatus};

pub const START_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
pub const START_CONFIRM_POLL: Duration = Duration::from_millis(500);
pub const STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub launcher_pid: u32,
    /// `None` when the child did not record itself within the timeout.
    pub confirmed: Option<DaemonState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// The recorded pid was already dead; the record was removed.
    Stale { pid: u32 },
    Stopped {
        pid: u32,
        mode: RunMode,
        /// Escalated to a forceful kill after the grace period.
        forced: bool,
    },
}

#[derive(Clone)]
pub struct LifecycleManager {
    guard: InstanceGuard,
    confirm_timeout: Duration,
    confirm_poll: Duration,
    stop_grace: Duration,
}

impl LifecycleManager {
    pub fn new(guard: InstanceGuard) -> Self {
        Self {
            guard,
            confirm_timeout: START_CONFIRM_TIMEOUT,
            confirm_poll: START_CONFIRM_POLL,
            stop_grace: STOP_GRACE,
        }
    }

    pub fn with_timings(mut self, confirm_timeout: Duration, confirm_poll: Duration, stop_grace: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self.confirm_poll = confirm_poll;
        self.stop_grace = stop_grace;
        self
    }

    pub fn guard(&self) -> &InstanceGuard {
        &self.guard
    }

    pub fn status(&self) -> InstanceStatus {
        self.guard.status()
    }

    /// Launch `program args…` detached and wait for it to claim the loop.
    pub async fn start(&self, program: &Path, args: &[OsString]) -> Result<StartOutcome, DaemonError> {
        self.guard.ensure_available()?;
        let launcher_pid = spawn_detached(program, args)?;
        tracing::info!(launcher_pid, "started background sync process");
        let confirmed = self.confirm_started().await;
        Ok(StartOutcome {
            launcher_pid,
            confirmed,
        })
    }

    /// Poll the state file until a live owner appears or the timeout passes.
    pub async fn confirm_started(&self) -> Option<DaemonState> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.confirm_poll).await;
            if let InstanceStatus::Running(state) = self.guard.status() {
                return Some(state);
            }
        }
        None
    }

    pub async fn stop(&self) -> Result<StopOutcome, DaemonError> {
        let store = self.guard.store();
        let Some(state) = store.load() else {
            return Ok(StopOutcome::NotRunning);
        };
        let processes = self.guard.processes();

        if !processes.is_alive(state.pid) {
            store.clear()?;
            return Ok(StopOutcome::Stale { pid: state.pid });
        }

        tracing::info!(pid = state.pid, mode = %state.mode, "stopping sync");
        let mut forced = false;
        match processes.terminate(state.pid) {
            Ok(()) => {
                tokio::time::sleep(self.stop_grace).await;
                if cfg!(unix) && processes.is_alive(state.pid) {
                    forced = true;
                    if let Err(err) = processes.kill(state.pid) {
                        tracing::warn!(pid = state.pid, error = %err, "forceful kill failed");
                    }
                }
            }
            Err(err) => tracing::warn!(pid = state.pid, error = %err, "termination request failed"),
        }

        store.clear()?;
        Ok(StopOutcome::Stopped {
            pid: state.pid,
            mode: state.mode,
            forced,
        })
    }
}

/// Spawn detached from the controlling terminal: a new session on POSIX, a
/// new process group without a console on Windows.
pub fn spawn_detached(program: &Path, args: &[OsString]) -> Result<u32, DaemonError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(&mut command);
    let child = command.spawn().map_err(|e| io_err(program, e))?;
    Ok(child.id())
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

/// Canonical path of the running executable, used as the owner identity.
pub fn current_owner_path() -> Result<PathBuf, DaemonError> {
    let exe = std::env::current_exe().map_err(|e| io_err("current_exe", e))?;
    Ok(exe.canonicalize().unwrap_or(exe))
}
