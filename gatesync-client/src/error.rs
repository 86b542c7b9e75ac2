//! Remote-call error taxonomy shared by the identity provider and registry
//! clients.

use thiserror::Error;

use crate::transport::{HttpResponse, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// HTTP 401: credential invalid or expired. Re-authentication needed.
    #[error("unauthorized (401) from {url}: credential invalid or expired")]
    Unauthorized { url: String },

    /// HTTP 403: a permission problem, not a token problem.
    #[error(
        "access forbidden (403) from {url}: your account may not have permission to use this service; contact your administrator"
    )]
    Forbidden { url: String },

    #[error("server error ({status}) from {url}: {body}")]
    ServerError {
        url: String,
        status: u16,
        body: String,
    },

    #[error("cannot connect to {url}; check network/DNS ({detail})")]
    NetworkUnreachable { url: String, detail: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned invalid JSON ({detail}); the server may be experiencing issues")]
    MalformedResponse { url: String, detail: String },

    #[error("request to {url} failed: {detail}")]
    RequestFailed { url: String, detail: String },

    /// Token endpoint answered the device-code poll with a terminal error
    /// code (`access_denied`, `expired_token`, …).
    #[error("device flow failed: {0}")]
    DeviceFlowRejected(String),

    #[error("device code expired before the browser login completed")]
    DeviceFlowExpired,
}

impl ApiError {
    /// Network-level failures a later attempt may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkUnreachable { .. } | ApiError::Timeout { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub(crate) fn from_transport(url: &str, err: TransportError) -> Self {
        match err {
            TransportError::Connect(detail) => ApiError::NetworkUnreachable {
                url: url.to_string(),
                detail,
            },
            TransportError::Timeout(_) => ApiError::Timeout {
                url: url.to_string(),
            },
            TransportError::Other(detail) => ApiError::RequestFailed {
                url: url.to_string(),
                detail,
            },
        }
    }

    /// Map a non-success response by status.
    pub(crate) fn from_status(url: &str, response: HttpResponse) -> Self {
        match response.status {
            401 => ApiError::Unauthorized {
                url: url.to_string(),
            },
            403 => ApiError::Forbidden {
                url: url.to_string(),
            },
            status => ApiError::ServerError {
                url: url.to_string(),
                status,
                body: response.body,
            },
        }
    }
}

/// Transport result → success response or classified error.
pub(crate) fn expect_success(
    url: &str,
    result: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, ApiError> {
    let response = result.map_err(|err| ApiError::from_transport(url, err))?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_status(url, response))
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    response: &HttpResponse,
) -> Result<T, ApiError> {
    serde_json::from_str(&response.body).map_err(|err| ApiError::MalformedResponse {
        url: url.to_string(),
        detail: err.to_string(),
    })
}
