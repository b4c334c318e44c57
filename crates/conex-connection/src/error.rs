use std::path::PathBuf;

/// Errors raised while looking up or resolving a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
  #[error("connection not found: {0}")]
  NotFound(String),

  /// A credential field required by the auth type is absent or empty.
  #[error("connection '{connection_id}' is missing credential '{field}'")]
  MissingCredential { connection_id: String, field: String },

  /// A credential field is present but unusable.
  #[error("connection '{connection_id}' has an invalid credential: {message}")]
  InvalidCredential {
    connection_id: String,
    message: String,
  },

  /// The OAuth2 token endpoint could not be reached or refused the request.
  #[error("token exchange for connection '{connection_id}' failed: {message}")]
  TokenExchange {
    connection_id: String,
    message: String,
    retryable: bool,
  },

  /// The connection store could not be loaded.
  #[error("failed to load connections from {path:?}: {message}")]
  Load { path: PathBuf, message: String },
}

impl ConnectionError {
  pub fn missing(connection_id: &str, field: &str) -> Self {
    Self::MissingCredential {
      connection_id: connection_id.to_string(),
      field: field.to_string(),
    }
  }

  /// Whether resolving the same connection again may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ConnectionError::TokenExchange {
        retryable: true,
        ..
      }
    )
  }
}
