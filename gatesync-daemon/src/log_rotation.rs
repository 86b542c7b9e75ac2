//! Size-based rotation of the detached sync log.
//!
//! Checked once when a detached loop starts. Past the threshold the live log
//! shifts down a numbered chain, the oldest copy is dropped:
//!
//! ```text
//! mcp-gateway-sync.log → .log.1 → .log.2 → … → .log.5 (deleted on next rotation)
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_bytes: u64,
    pub keep: usize,
}

impl Default for LogRotation {
    /// 10 MiB, five backups.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 5,
        }
    }
}

impl LogRotation {
    /// Rotate `log` if it has reached `max_bytes`. `Ok(false)` when the file
    /// is smaller or missing.
    pub fn apply(&self, log: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.keep == 0 {
            return Ok(false);
        }

        let oldest = backup_path(log, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.keep).rev() {
            let from = backup_path(log, n);
            if from.exists() {
                fs::rename(&from, backup_path(log, n + 1))?;
            }
        }
        fs::rename(log, backup_path(log, 1))?;
        Ok(true)
    }
}

/// Rotate (best effort) and open the sync log for appending.
pub fn open_sync_log(log: &Path, rotation: LogRotation) -> Result<File, DaemonError> {
    match rotation.apply(log) {
        Ok(true) => tracing::info!(path = %log.display(), "sync log rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log.display(), error = %err, "sync log rotation failed"),
    }
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(log).map_err(|e| io_err(log, e))
}

/// `<log>.<n>`
pub fn backup_path(log: &Path, n: usize) -> PathBuf {
    let mut name = log.file_name().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SMALL: LogRotation = LogRotation {
        max_bytes: 64,
        keep: 3,
    };

    fn write_bytes(path: &Path, fill: u8, len: usize) {
        fs::write(path, vec![fill; len]).unwrap();
    }

    #[test]
    fn below_threshold_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync.log");
        write_bytes(&log, b'x', 10);
        assert!(!SMALL.apply(&log).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(!SMALL.apply(&dir.path().join("absent.log")).unwrap());
    }

    #[test]
    fn backups_shift_and_cap_at_keep() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync.log");

        for round in 0..5u8 {
            write_bytes(&log, b'a' + round, 100);
            assert!(SMALL.apply(&log).unwrap());
        }

        assert!(!log.exists(), "live log is recreated by the next open");
        assert_eq!(fs::read(backup_path(&log, 1)).unwrap()[0], b'e');
        assert_eq!(fs::read(backup_path(&log, 3)).unwrap()[0], b'c');
        assert!(!backup_path(&log, 4).exists());
    }

    #[test]
    fn open_appends_after_rotation() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("sync.log");
        write_bytes(&log, b'x', 100);

        let mut file = open_sync_log(&log, SMALL).unwrap();
        writeln!(file, "started").unwrap();
        drop(file);
        let mut file = open_sync_log(&log, SMALL).unwrap();
        writeln!(file, "again").unwrap();

        assert_eq!(fs::read_to_string(&log).unwrap(), "started\nagain\n");
        assert!(backup_path(&log, 1).exists());
    }

    #[test]
    fn backup_names_append_a_counter() {
        let log = Path::new("/tmp/mcp-gateway-sync.log");
        assert_eq!(
            backup_path(log, 2),
            PathBuf::from("/tmp/mcp-gateway-sync.log.2")
        );
    }
}
