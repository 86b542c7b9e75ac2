//! MCP gateway registry: `GET <registry>/api/servers`.

use std::sync::Arc;

use serde::Deserialize;

use gatesync_core::{ServerEntry, SyncConfig};

use crate::error::{decode, expect_success, ApiError};
use crate::transport::HttpTransport;

#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<ServerEntry>,
}

#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn HttpTransport>,
    servers_url: String,
}

impl RegistryClient {
    pub fn new(config: &SyncConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            servers_url: config.servers_url(),
        }
    }

    pub fn servers_url(&self) -> &str {
        &self.servers_url
    }

    /// Current server list. An empty list is a valid answer here; whether it
    /// is a failure is the caller's call.
    pub fn fetch(&self, access_token: &str) -> Result<Vec<ServerEntry>, ApiError> {
        let url = &self.servers_url;
        let response = expect_success(url, self.transport.get_with_bearer(url, access_token))?;
        let list: ServerList = decode(url, &response)?;
        tracing::debug!(count = list.servers.len(), "registry returned servers");
        Ok(list.servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> RegistryClient {
        let config = SyncConfig::from_lookup(|key| match key {
            "HORIZON_DOMAIN" => Some("dev.example.com".to_string()),
            _ => None,
        })
        .expect("config");
        RegistryClient::new(&config, transport.clone())
    }

    #[test]
    fn fetch_sends_bearer_and_parses_servers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_json(
            "/api/servers",
            200,
            json!({"servers": [
                {"display_name": "search", "path": "/search", "description": "ignored"},
                {"display_name": "tickets", "path": "tickets/"}
            ]}),
        );

        let servers = client(&transport).fetch("tok").expect("servers");
        assert_eq!(
            servers,
            vec![
                ServerEntry::new("search", "/search"),
                ServerEntry::new("tickets", "tickets/"),
            ]
        );

        let request = &transport.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://mcp.dev.example.com/api/servers");
        assert_eq!(request.bearer.as_deref(), Some("tok"));
    }

    #[test]
    fn missing_servers_key_is_an_empty_list() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_json("/api/servers", 200, json!({}));
        assert!(client(&transport).fetch("tok").expect("servers").is_empty());
    }

    #[test]
    fn invalid_json_is_malformed_response() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply_raw("/api/servers", 200, "<html>");
        assert!(matches!(
            client(&transport).fetch("tok"),
            Err(ApiError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn unauthorized_and_forbidden_are_distinct() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .reply_raw("/api/servers", 401, "")
            .reply_raw("/api/servers", 403, "");
        let client = client(&transport);
        assert!(client.fetch("tok").unwrap_err().is_unauthorized());
        assert!(matches!(client.fetch("tok"), Err(ApiError::Forbidden { .. })));
    }
}
