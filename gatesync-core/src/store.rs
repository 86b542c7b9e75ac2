//! Atomic JSON persistence for the token and daemon-state files.
//!
//! ## Write protocol
//!
//! 1. Serialize the record.
//! 2. Create a fresh hidden temp file in the target's directory (same
//!    filesystem, so the rename cannot cross devices).
//! 3. Write, fsync, apply permissions.
//! 4. Rename onto the target.
//!
//! Any failure after step 2 drops the temp file (removing it) and returns the
//! original error; the target keeps its prior content or stays absent.
//!
//! ## Read protocol
//!
//! Missing, unreadable and malformed files are all "absent" to `load`.
//! `try_load` exposes the distinction for diagnostics.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, StoreError};
use crate::types::{DaemonState, TokenRecord};

/// Permission policy for the replaced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    /// `0600` on POSIX. Secrets and process state.
    OwnerOnly,
    /// Keep the target's current mode; fall back to the process default.
    PreserveExisting,
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    temp_prefix: &str,
    access: FileAccess,
) -> Result<(), StoreError> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic_with(path, &json, temp_prefix, access, |_| Ok(()))
}

/// Same as [`write_json_atomic`] for raw bytes. `before_persist` runs after
/// the temp file is complete and before the rename.
pub(crate) fn write_atomic_with<F>(
    path: &Path,
    bytes: &[u8],
    temp_prefix: &str,
    access: FileAccess,
    before_persist: F,
) -> Result<(), StoreError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let previous_mode = match access {
        FileAccess::OwnerOnly => None,
        FileAccess::PreserveExisting => fs::metadata(path).ok().map(|m| m.permissions()),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(temp_prefix)
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();

    tmp.write_all(bytes).map_err(|e| io_err(&tmp_path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_err(&tmp_path, e))?;

    match (access, previous_mode) {
        (FileAccess::OwnerOnly, _) => set_owner_only(&tmp_path)?,
        (FileAccess::PreserveExisting, Some(perms)) => {
            fs::set_permissions(&tmp_path, perms).map_err(|e| io_err(&tmp_path, e))?
        }
        (FileAccess::PreserveExisting, None) => set_default_mode(&tmp_path)?,
    }

    before_persist(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;

    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    Ok(())
}

/// `Ok(None)` when the file does not exist, `Err(Corrupt)` when it does not
/// parse as `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Record files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RecordFile {
    path: PathBuf,
    temp_prefix: &'static str,
}

impl RecordFile {
    fn try_load<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        read_json(&self.path)
    }

    fn load<T: DeserializeOwned>(&self) -> Option<T> {
        match self.try_load() {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "treating unreadable state as absent");
                None
            }
        }
    }

    fn save<T: Serialize>(&self, record: &T) -> Result<(), StoreError> {
        write_json_atomic(&self.path, record, self.temp_prefix, FileAccess::OwnerOnly)
    }
}

/// Durable storage of the current OAuth credential set.
#[derive(Debug, Clone)]
pub struct TokenStore {
    file: RecordFile,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: RecordFile {
                path: path.into(),
                temp_prefix: ".token-temp-",
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn try_load(&self) -> Result<Option<TokenRecord>, StoreError> {
        self.file.try_load()
    }

    /// Current record, or `None` if missing or unreadable.
    pub fn load(&self) -> Option<TokenRecord> {
        self.file.load()
    }

    pub fn save(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.file.save(record)?;
        tracing::debug!(path = %self.file.path.display(), "token file updated");
        Ok(())
    }
}

/// Durable record of which process owns the sync loop.
#[derive(Debug, Clone)]
pub struct DaemonStateStore {
    file: RecordFile,
}

impl DaemonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: RecordFile {
                path: path.into(),
                temp_prefix: ".state-temp-",
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn try_load(&self) -> Result<Option<DaemonState>, StoreError> {
        self.file.try_load()
    }

    pub fn load(&self) -> Option<DaemonState> {
        self.file.load()
    }

    pub fn save(&self, state: &DaemonState) -> Result<(), StoreError> {
        self.file.save(state)
    }

    /// Remove the state file. Already-absent is success.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.file.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.file.path, err)),
        }
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_default_mode(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_default_mode(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
