//! Runtime configuration, resolved once at startup and passed to every
//! component.
//!
//! | Variable           | Default                               |
//! |--------------------|---------------------------------------|
//! | `HORIZON_DOMAIN`   | — (required)                          |
//! | `KEYCLOAK_URL`     | `https://<HORIZON_DOMAIN>/auth`       |
//! | `REALM`            | `horizon`                             |
//! | `CLIENT_ID`        | `mcp-gateway-registry-cli`            |
//! | `MCP_REGISTRY_URL` | `https://mcp.<HORIZON_DOMAIN>`        |

use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_BASE_DOMAIN: &str = "HORIZON_DOMAIN";
pub const ENV_KEYCLOAK_URL: &str = "KEYCLOAK_URL";
pub const ENV_REALM: &str = "REALM";
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_REGISTRY_URL: &str = "MCP_REGISTRY_URL";

pub const DEFAULT_REALM: &str = "horizon";
pub const DEFAULT_CLIENT_ID: &str = "mcp-gateway-registry-cli";

/// Substituted at image build time; still present means "not configured".
const DOMAIN_PLACEHOLDER: &str = "##DOMAIN##";

/// Per-request timeout for identity provider and registry calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_domain: String,
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    pub registry_url: String,
}

impl SyncConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_domain = get(ENV_BASE_DOMAIN)
            .filter(|d| d != DOMAIN_PLACEHOLDER)
            .ok_or(ConfigError::MissingBaseDomain)?;

        let keycloak_url =
            get(ENV_KEYCLOAK_URL).unwrap_or_else(|| format!("https://{base_domain}/auth"));
        let realm = get(ENV_REALM).unwrap_or_else(|| DEFAULT_REALM.to_string());
        let client_id = get(ENV_CLIENT_ID).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let registry_url =
            get(ENV_REGISTRY_URL).unwrap_or_else(|| format!("https://mcp.{base_domain}"));

        Ok(Self {
            base_domain,
            keycloak_url,
            realm,
            client_id,
            registry_url,
        })
    }

    /// `<keycloak>/realms/<realm>/protocol/openid-connect`
    pub fn oidc_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect",
            self.keycloak_url.trim_end_matches('/'),
            self.realm
        )
    }

    pub fn device_auth_url(&self) -> String {
        format!("{}/auth/device", self.oidc_url())
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.oidc_url())
    }

    /// Registry base without trailing slash. Managed settings entries are
    /// recognised by this prefix.
    pub fn registry_base(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }

    pub fn servers_url(&self) -> String {
        format!("{}/api/servers", self.registry_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_derive_from_base_domain() {
        let cfg = SyncConfig::from_lookup(lookup(&[(ENV_BASE_DOMAIN, "dev.example.com")]))
            .expect("config");
        assert_eq!(cfg.keycloak_url, "https://dev.example.com/auth");
        assert_eq!(cfg.realm, "horizon");
        assert_eq!(cfg.client_id, "mcp-gateway-registry-cli");
        assert_eq!(cfg.registry_url, "https://mcp.dev.example.com");
        assert_eq!(
            cfg.device_auth_url(),
            "https://dev.example.com/auth/realms/horizon/protocol/openid-connect/auth/device"
        );
        assert_eq!(
            cfg.token_url(),
            "https://dev.example.com/auth/realms/horizon/protocol/openid-connect/token"
        );
        assert_eq!(cfg.servers_url(), "https://mcp.dev.example.com/api/servers");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let cfg = SyncConfig::from_lookup(lookup(&[
            (ENV_BASE_DOMAIN, "dev.example.com"),
            (ENV_KEYCLOAK_URL, "http://localhost:8080/"),
            (ENV_REALM, "lab"),
            (ENV_CLIENT_ID, "cli"),
            (ENV_REGISTRY_URL, "http://localhost:7860/"),
        ]))
        .expect("config");
        assert_eq!(
            cfg.token_url(),
            "http://localhost:8080/realms/lab/protocol/openid-connect/token"
        );
        assert_eq!(cfg.client_id, "cli");
        assert_eq!(cfg.registry_base(), "http://localhost:7860");
    }

    #[test]
    fn missing_or_placeholder_domain_is_a_configuration_error() {
        for pairs in [
            vec![],
            vec![(ENV_BASE_DOMAIN, "")],
            vec![(ENV_BASE_DOMAIN, "##DOMAIN##")],
        ] {
            let err = SyncConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, ConfigError::MissingBaseDomain));
            assert!(err.to_string().contains("HORIZON_DOMAIN"));
        }
    }
}
