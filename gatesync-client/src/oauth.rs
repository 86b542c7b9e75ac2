//! OAuth2 Device Authorization Grant (RFC 8628) and refresh-token exchange.
//!
//! The client is blocking and stateless; the caller drives the poll loop:
//!
//! 1. [`OAuthDeviceClient::start_device_authorization`] → show
//!    [`DeviceAuthorization::verification_target`] to the operator.
//! 2. Every [`DevicePollSchedule::interval`] call
//!    [`OAuthDeviceClient::poll_device_token`] until it yields
//!    [`PollOutcome::Granted`], fails, or [`DevicePollSchedule::expired`].
//! 3. [`PollOutcome::SlowDown`] feeds back into the schedule via
//!    [`DevicePollSchedule::slow_down`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use gatesync_core::{SyncConfig, TokenGrant};

use crate::error::{decode, expect_success, ApiError};
use crate::transport::HttpTransport;

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_DEVICE_CODE_LIFETIME_SECS: u64 = 300;
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(2);

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_lifetime() -> u64 {
    DEFAULT_DEVICE_CODE_LIFETIME_SECS
}

/// Device-authorization endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub verification_uri: Option<String>,
    #[serde(default)]
    pub user_code: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_lifetime")]
    pub expires_in: u64,
}

impl DeviceAuthorization {
    /// What the operator should open in a browser.
    pub fn verification_target(&self) -> String {
        match (
            &self.verification_uri_complete,
            &self.verification_uri,
            &self.user_code,
        ) {
            (Some(complete), _, _) => complete.clone(),
            (None, Some(uri), Some(code)) => format!("{uri} (code: {code})"),
            (None, Some(uri), None) => uri.clone(),
            (None, None, _) => "<provider returned no verification URI>".to_string(),
        }
    }
}

/// Result of one token-endpoint poll that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// `authorization_pending`: keep polling at the current interval.
    Pending,
    /// `slow_down`: keep polling, at a longer interval.
    SlowDown,
    Granted(TokenGrant),
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Poll pacing for one device-code session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePollSchedule {
    interval: Duration,
    lifetime: Duration,
}

impl DevicePollSchedule {
    pub fn for_authorization(auth: &DeviceAuthorization) -> Self {
        Self {
            interval: Duration::from_secs(auth.interval.max(1)),
            lifetime: Duration::from_secs(auth.expires_in),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn slow_down(&mut self) {
        self.interval += SLOW_DOWN_INCREMENT;
    }

    /// The device code is dead once `elapsed` reaches its lifetime.
    pub fn expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.lifetime
    }
}

#[derive(Clone)]
pub struct OAuthDeviceClient {
    transport: Arc<dyn HttpTransport>,
    device_auth_url: String,
    token_url: String,
    client_id: String,
}

impl OAuthDeviceClient {
    pub fn new(config: &SyncConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            device_auth_url: config.device_auth_url(),
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Step 1 of the device flow.
    pub fn start_device_authorization(&self) -> Result<DeviceAuthorization, ApiError> {
        tracing::info!(client_id = %self.client_id, "initiating device authorization");
        let url = &self.device_auth_url;
        let response = expect_success(
            url,
            self.transport
                .post_form(url, &[("client_id", self.client_id.as_str())]),
        )?;
        decode(url, &response)
    }

    /// One poll of the token endpoint with the device code.
    ///
    /// `authorization_pending` and `slow_down` are outcomes; any other error
    /// code is terminal ([`ApiError::DeviceFlowRejected`]).
    pub fn poll_device_token(&self, device_code: &str) -> Result<PollOutcome, ApiError> {
        let url = &self.token_url;
        let response = self
            .transport
            .post_form(
                url,
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", device_code),
                    ("client_id", self.client_id.as_str()),
                ],
            )
            .map_err(|err| ApiError::from_transport(url, err))?;

        if response.is_success() {
            return decode(url, &response).map(PollOutcome::Granted);
        }

        match serde_json::from_str::<OAuthErrorBody>(&response.body) {
            Ok(body) => match body.error.as_str() {
                "authorization_pending" => Ok(PollOutcome::Pending),
                "slow_down" => Ok(PollOutcome::SlowDown),
                _ => Err(ApiError::DeviceFlowRejected(match body.error_description {
                    Some(desc) => format!("{} ({desc})", body.error),
                    None => body.error,
                })),
            },
            Err(_) => Err(ApiError::from_status(url, response)),
        }
    }

    /// Exchange a refresh token for a new grant.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let url = &self.token_url;
        let response = expect_success(
            url,
            self.transport.post_form(
                url,
                &[
                    ("grant_type", REFRESH_TOKEN_GRANT),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                ],
            ),
        )?;
        let grant: TokenGrant = decode(url, &response)?;
        tracing::debug!(expires_in = grant.expires_in, "access token refreshed");
        Ok(grant)
    }
}
