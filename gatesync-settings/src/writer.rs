//! Settings-file read/merge/write.
//!
//! ## `SettingsFile::apply`
//!
//! 1. Load the document. Missing, unparseable or non-object content is
//!    treated as `{}` (with a warning for the latter two).
//! 2. Ensure `mcpServers` exists as an object.
//! 3. Merge (see [`crate::merge`]).
//! 4. Render as pretty JSON; skip the write when the bytes are unchanged.
//! 5. Atomically replace the file, preserving its permissions.
//!
//! Other top-level keys pass through untouched and in their original order.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use gatesync_core::store::{write_json_atomic, FileAccess};
use gatesync_core::ServerEntry;

use crate::error::{io_err, SettingsError};
use crate::merge::{merge_servers, MergeMode, MergeReport, MANAGED_SECTION};

const TEMP_PREFIX: &str = ".settings-temp-";

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Written { path: PathBuf },
    /// Merged document is byte-identical to what is on disk.
    Unchanged { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub report: MergeReport,
    pub write: WriteResult,
}

// ---------------------------------------------------------------------------
// SettingsFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current top-level document, `{}` when absent or unusable.
    pub fn load_document(&self) -> Result<Map<String, Value>, SettingsError> {
        Ok(self.read_raw()?.map(|raw| parse_document(&self.path, &raw)).unwrap_or_default())
    }

    pub fn apply(
        &self,
        access_token: &str,
        servers: &[ServerEntry],
        registry_base: &str,
        mode: MergeMode,
    ) -> Result<SettingsUpdate, SettingsError> {
        let existing = self.read_raw()?;
        let mut document = existing
            .as_deref()
            .map(|raw| parse_document(&self.path, raw))
            .unwrap_or_default();

        let section = document
            .entry(MANAGED_SECTION.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            tracing::warn!(
                path = %self.path.display(),
                "'{MANAGED_SECTION}' is not an object; replacing it"
            );
            *section = Value::Object(Map::new());
        }
        let report = match section.as_object_mut() {
            Some(section) => merge_servers(section, registry_base, access_token, servers, mode),
            None => MergeReport::default(),
        };

        let mut rendered = serde_json::to_string_pretty(&document)?;
        rendered.push('\n');
        if existing.as_deref() == Some(rendered.as_str()) {
            tracing::debug!("unchanged: {}", self.path.display());
            return Ok(SettingsUpdate {
                report,
                write: WriteResult::Unchanged {
                    path: self.path.clone(),
                },
            });
        }

        write_json_atomic(&self.path, &document, TEMP_PREFIX, FileAccess::PreserveExisting)?;
        tracing::info!("wrote: {}", self.path.display());
        Ok(SettingsUpdate {
            report,
            write: WriteResult::Written {
                path: self.path.clone(),
            },
        })
    }

    fn read_raw(&self) -> Result<Option<String>, SettingsError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&self.path, err)),
        }
    }
}

fn parse_document(path: &Path, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "settings file is not a JSON object; starting from {{}}");
            Map::new()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "settings file is not valid JSON; starting from {{}}");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const BASE: &str = "https://mcp.dev.example.com";

    fn settings(dir: &TempDir, body: &str) -> SettingsFile {
        let path = dir.path().join("settings.json");
        fs::write(&path, body).unwrap();
        SettingsFile::new(path)
    }

    #[test]
    fn missing_file_is_created_with_section() {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::new(dir.path().join("nested/settings.json"));
        let update = file
            .apply("tok", &[ServerEntry::new("search", "/search")], BASE, MergeMode::Upsert)
            .unwrap();
        assert!(matches!(update.write, WriteResult::Written { .. }));
        let doc = file.load_document().unwrap();
        assert_eq!(
            doc[MANAGED_SECTION]["search"]["httpUrl"],
            json!("https://mcp.dev.example.com/search/mcp")
        );
    }

    #[test]
    fn invalid_json_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let file = settings(&dir, "{ not json");
        assert!(file.load_document().unwrap().is_empty());
        file.apply("tok", &[ServerEntry::new("a", "a")], BASE, MergeMode::Upsert)
            .unwrap();
        assert!(file.load_document().unwrap()[MANAGED_SECTION]
            .get("a")
            .is_some());
    }

    #[test]
    fn second_identical_apply_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let file = settings(&dir, "{}\n");
        let servers = [ServerEntry::new("a", "/a")];
        file.apply("tok", &servers, BASE, MergeMode::Upsert).unwrap();
        let update = file.apply("tok", &servers, BASE, MergeMode::Upsert).unwrap();
        assert!(matches!(update.write, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn non_object_section_is_replaced() {
        let dir = TempDir::new().unwrap();
        let file = settings(&dir, r#"{"mcpServers": []}"#);
        file.apply("tok", &[ServerEntry::new("a", "/a")], BASE, MergeMode::Upsert)
            .unwrap();
        assert!(file.load_document().unwrap()[MANAGED_SECTION].is_object());
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file = settings(&dir, "{}");
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o640)).unwrap();
        file.apply("tok", &[ServerEntry::new("a", "/a")], BASE, MergeMode::Upsert)
            .unwrap();
        let mode = fs::metadata(file.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
