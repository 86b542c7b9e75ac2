//! Process liveness and termination.
//!
//! POSIX uses the null signal for liveness and `SIGTERM`/`SIGKILL` for
//! termination. Windows queries `tasklist` and terminates with
//! `taskkill /F` (there is no graceful equivalent for a detached process).
//! Any failure to determine liveness reads as "not alive".

use std::io;

pub trait ProcessControl: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to exit. Forceful on Windows.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forceful kill; used after the grace period on POSIX.
    fn kill(&self, pid: u32) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(unix)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        match to_pid_t(pid) {
            // SAFETY: signal 0 performs error checking only; nothing is delivered.
            Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
            None => false,
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGKILL)
    }
}

/// Reject 0 (our own process group) and values that would wrap negative.
#[cfg(unix)]
fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 0)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = to_pid_t(pid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    // SAFETY: plain kill(2) on a validated positive pid.
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        use std::process::Command;

        if pid == 0 {
            return false;
        }
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/FO", "CSV", "/NH"])
            .output();
        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\""))
            }
            _ => false,
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        use std::process::Command;

        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {status}"),
            ))
        }
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        self.terminate(pid)
    }
}
