//! Blocking HTTP seam.
//!
//! Production uses [`UreqTransport`]. Non-2xx statuses are *responses*, not
//! errors, at this layer; only connection-level failures are
//! [`TransportError`]s.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS resolution or TCP/TLS connect failed.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub trait HttpTransport: Send + Sync {
    /// `POST` an `application/x-www-form-urlencoded` body.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, TransportError>;

    /// `GET` with `Authorization: Bearer <token>`.
    fn get_with_bearer(&self, url: &str, token: &str) -> Result<HttpResponse, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("gatesync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl HttpTransport for UreqTransport {
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, "POST");
        into_response(self.agent.post(url).send_form(form))
    }

    fn get_with_bearer(&self, url: &str, token: &str) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, "GET");
        into_response(
            self.agent
                .get(url)
                .set("Authorization", &format!("Bearer {token}"))
                .set("Accept", "application/json")
                .call(),
        )
    }
}

fn into_response(
    result: Result<ureq::Response, ureq::Error>,
) -> Result<HttpResponse, TransportError> {
    match result {
        Ok(response) => read_body(response),
        Err(ureq::Error::Status(_, response)) => read_body(response),
        Err(ureq::Error::Transport(transport)) => Err(classify_transport(&transport)),
    }
}

fn read_body(response: ureq::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status();
    let body = response.into_string().map_err(|err| {
        if is_timeout_io(&err) {
            TransportError::Timeout(err.to_string())
        } else {
            TransportError::Other(format!("failed to read response body: {err}"))
        }
    })?;
    Ok(HttpResponse { status, body })
}

fn classify_transport(transport: &ureq::Transport) -> TransportError {
    let message = transport.to_string();
    let timed_out = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map(is_timeout_io)
        .unwrap_or(false)
        || message.contains("timed out");

    if timed_out {
        return TransportError::Timeout(message);
    }
    match transport.kind() {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
            TransportError::Connect(message)
        }
        _ => TransportError::Other(message),
    }
}

fn is_timeout_io(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
