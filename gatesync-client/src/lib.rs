//! # gatesync-client
//!
//! Identity-provider and registry clients. Every transport or HTTP failure is
//! folded into [`ApiError`] at this boundary; callers decide retry-vs-fatal
//! from the error kind, never from raw status codes.

pub mod error;
pub mod oauth;
pub mod registry;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::ApiError;
pub use oauth::{DeviceAuthorization, DevicePollSchedule, OAuthDeviceClient, PollOutcome};
pub use registry::RegistryClient;
pub use transport::{HttpResponse, HttpTransport, TransportError, UreqTransport};
