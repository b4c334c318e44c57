//! Conex Host HTTP
//!
//! Outbound HTTP for flow runners. Runners never talk to `reqwest`
//! directly; they build an [`HttpRequest`] and hand it to an
//! [`HttpTransport`]. The production transport is [`ReqwestTransport`];
//! tests plug in scripted transports instead.

mod client;
mod error;
mod request;

pub use client::ReqwestTransport;
pub use error::HttpError;
pub use request::{Body, HttpRequest, HttpResponse, parse_method};
pub use reqwest::Method;

use async_trait::async_trait;

/// Sends a single HTTP request.
///
/// Implementations must enforce `request.timeout` and report it as
/// [`HttpError::Timeout`]. Non-2xx responses are not errors at this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}
