//! Merge rules for the managed `mcpServers` section.
//!
//! Applied in order:
//!
//! 1. `Force`: the section is emptied first (destructive, foreign entries go too).
//! 2. Every complete [`ServerEntry`] is upserted under its `display_name` with
//!    `httpUrl = <registry>/<path>/mcp` and a fresh bearer header.
//! 3. `Prune`: managed entries (URL under the registry base) whose key is not
//!    in the current server list are removed. Foreign entries are never pruned.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use gatesync_core::ServerEntry;

use crate::error::SettingsError;

/// Top-level settings key owned by the sync tool.
pub const MANAGED_SECTION: &str = "mcpServers";

const URL_KEY: &str = "httpUrl";
const HEADERS_KEY: &str = "headers";
const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Upsert only; stale entries stay.
    #[default]
    Upsert,
    /// Upsert, then drop managed entries the registry no longer lists.
    Prune,
    /// Replace the whole section with the registry's servers.
    Force,
}

impl MergeMode {
    pub fn from_flags(prune: bool, force: bool) -> Result<Self, SettingsError> {
        match (prune, force) {
            (true, true) => Err(SettingsError::ConflictingModes),
            (true, false) => Ok(MergeMode::Prune),
            (false, true) => Ok(MergeMode::Force),
            (false, false) => Ok(MergeMode::Upsert),
        }
    }
}

/// What a merge did, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// `Force` discarded this many pre-existing entries.
    pub cleared: usize,
    pub upserted: Vec<String>,
    pub pruned: Vec<String>,
    /// Registry entries missing `display_name` or `path`.
    pub skipped: Vec<ServerEntry>,
}

/// `<registry_base>/<normalized path>/mcp`
pub fn server_url(registry_base: &str, entry: &ServerEntry) -> String {
    format!(
        "{}/{}/mcp",
        registry_base.trim_end_matches('/'),
        entry.normalized_path()
    )
}

/// An entry is managed when its URL lives under the registry base.
///
/// Stricter than a bare string prefix: the match has to end at a `/` (or the
/// end of the URL), so `https://mcp.example.com.other.net/...` is not claimed
/// by a base of `https://mcp.example.com` and survives prune. Keep it that way.
pub fn is_managed(entry: &Value, registry_base: &str) -> bool {
    let Some(url) = entry.get(URL_KEY).and_then(Value::as_str) else {
        return false;
    };
    let url = url.trim_end_matches('/');
    let base = registry_base.trim_end_matches('/');
    match url.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn merge_servers(
    section: &mut Map<String, Value>,
    registry_base: &str,
    access_token: &str,
    servers: &[ServerEntry],
    mode: MergeMode,
) -> MergeReport {
    let mut report = MergeReport::default();

    if mode == MergeMode::Force {
        report.cleared = section.len();
        section.clear();
    }

    let bearer = format!("Bearer {access_token}");
    let mut desired = HashSet::new();
    for server in servers {
        if !server.is_complete() {
            tracing::warn!(?server, "skipping registry server with missing fields");
            report.skipped.push(server.clone());
            continue;
        }
        desired.insert(server.display_name.as_str());
        upsert(section, &server.display_name, server_url(registry_base, server), &bearer);
        tracing::debug!(server = %server.display_name, "upserted MCP server");
        report.upserted.push(server.display_name.clone());
    }

    if mode == MergeMode::Prune {
        let stale: Vec<String> = section
            .iter()
            .filter(|(name, entry)| {
                is_managed(entry, registry_base) && !desired.contains(name.as_str())
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            section.shift_remove(&name);
            tracing::debug!(server = %name, "pruned MCP server no longer in registry");
            report.pruned.push(name);
        }
    }

    report
}

/// Overwrite URL and Authorization header; other keys the user added to the
/// entry (timeouts, extra headers) are kept.
fn upsert(section: &mut Map<String, Value>, name: &str, url: String, bearer: &str) {
    let entry = section
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    let Some(fields) = entry.as_object_mut() else {
        return;
    };
    fields.insert(URL_KEY.to_string(), Value::String(url));

    let headers = fields
        .entry(HEADERS_KEY.to_string())
        .or_insert_with(|| json!({}));
    if !headers.is_object() {
        *headers = json!({});
    }
    if let Some(headers) = headers.as_object_mut() {
        headers.insert(AUTHORIZATION.to_string(), Value::String(bearer.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://mcp.dev.example.com";

    fn managed(path: &str) -> Value {
        json!({"httpUrl": format!("{BASE}/{path}/mcp"), "headers": {"Authorization": "Bearer old"}})
    }

    fn foreign() -> Value {
        json!({"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem"]})
    }

    #[test]
    fn upsert_into_empty_section() {
        let mut section = Map::new();
        let report = merge_servers(
            &mut section,
            BASE,
            "tok",
            &[ServerEntry::new("search", "/search")],
            MergeMode::Upsert,
        );
        assert_eq!(report.upserted, vec!["search"]);
        assert_eq!(
            Value::Object(section),
            json!({"search": {
                "httpUrl": "https://mcp.dev.example.com/search/mcp",
                "headers": {"Authorization": "Bearer tok"}
            }})
        );
    }

    #[test]
    fn upsert_refreshes_token_and_keeps_user_fields() {
        let mut section = Map::new();
        section.insert(
            "search".into(),
            json!({"httpUrl": "https://stale/search/mcp", "timeout": 5000,
                   "headers": {"Authorization": "Bearer old", "X-Trace": "1"}}),
        );
        merge_servers(
            &mut section,
            BASE,
            "new",
            &[ServerEntry::new("search", "search")],
            MergeMode::Upsert,
        );
        let entry = &section["search"];
        assert_eq!(entry["httpUrl"], json!(format!("{BASE}/search/mcp")));
        assert_eq!(entry["headers"]["Authorization"], json!("Bearer new"));
        assert_eq!(entry["headers"]["X-Trace"], json!("1"));
        assert_eq!(entry["timeout"], json!(5000));
    }

    #[test]
    fn prune_removes_only_managed_entries() {
        let mut section = Map::new();
        section.insert("old".into(), managed("old"));
        section.insert("filesystem".into(), foreign());

        let report = merge_servers(&mut section, BASE, "tok", &[], MergeMode::Prune);
        assert_eq!(report.pruned, vec!["old"]);
        assert!(section.contains_key("filesystem"));
        assert!(!section.contains_key("old"));
    }

    #[test]
    fn upsert_mode_never_prunes() {
        let mut section = Map::new();
        section.insert("old".into(), managed("old"));
        merge_servers(&mut section, BASE, "tok", &[], MergeMode::Upsert);
        assert!(section.contains_key("old"));
    }

    #[test]
    fn force_discards_everything_before_merge() {
        let mut section = Map::new();
        section.insert("old".into(), managed("old"));
        section.insert("filesystem".into(), foreign());

        let servers = [ServerEntry::new("a", "/a"), ServerEntry::new("b", "/b")];
        let report = merge_servers(&mut section, BASE, "tok", &servers, MergeMode::Force);
        assert_eq!(report.cleared, 2);
        assert_eq!(section.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn incomplete_entries_are_skipped() {
        let mut section = Map::new();
        let report = merge_servers(
            &mut section,
            BASE,
            "tok",
            &[ServerEntry::new("", "/x"), ServerEntry::new("y", "")],
            MergeMode::Prune,
        );
        assert_eq!(report.skipped.len(), 2);
        assert!(section.is_empty());
    }

    #[test]
    fn managed_detection_requires_a_path_boundary() {
        assert!(is_managed(&managed("x"), BASE));
        assert!(is_managed(&json!({"httpUrl": format!("{BASE}/")}), &format!("{BASE}/")));
        assert!(!is_managed(
            &json!({"httpUrl": "https://mcp.dev.example.com.evil.net/x/mcp"}),
            BASE
        ));
        assert!(!is_managed(&foreign(), BASE));
        assert!(!is_managed(&json!("not an object"), BASE));
    }

    #[test]
    fn mode_flags_are_exclusive() {
        assert!(matches!(
            MergeMode::from_flags(true, true),
            Err(SettingsError::ConflictingModes)
        ));
        assert_eq!(MergeMode::from_flags(false, false).unwrap(), MergeMode::Upsert);
        assert_eq!(MergeMode::from_flags(true, false).unwrap(), MergeMode::Prune);
        assert_eq!(MergeMode::from_flags(false, true).unwrap(), MergeMode::Force);
    }
}
