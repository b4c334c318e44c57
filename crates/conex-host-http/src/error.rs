use std::time::Duration;

/// Errors raised while sending a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
  /// The request did not complete within its timeout.
  #[error("request to {url} timed out after {timeout:?}")]
  Timeout { url: String, timeout: Duration },

  /// Connection, DNS or protocol failure.
  #[error("request to {url} failed: {message}")]
  Network { url: String, message: String },

  /// The request could not be built.
  #[error("invalid request: {message}")]
  InvalidRequest { message: String },
}

impl HttpError {
  pub fn invalid_request(message: impl Into<String>) -> Self {
    Self::InvalidRequest {
      message: message.into(),
    }
  }

  /// Whether sending the same request again may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, HttpError::Timeout { .. } | HttpError::Network { .. })
  }
}
