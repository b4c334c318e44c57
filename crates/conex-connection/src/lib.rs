//! Conex Connection
//!
//! Credentials live in an external store and are looked up by id through a
//! [`ConnectionProvider`]. The [`ConnectionResolver`] turns a stored
//! connection into request headers and a template view, once per run.
//!
//! Secret values never reach logs: [`ResolvedConnection`] and the credential
//! map both redact themselves in `Debug` output.

mod auth;
mod error;
mod oauth;
mod resolver;
mod store;

pub use auth::{auth_headers, parse_custom_headers};
pub use error::ConnectionError;
pub use oauth::exchange_client_credentials;
pub use resolver::{ConnectionResolver, ResolvedConnection};
pub use store::InMemoryConnectionStore;

use async_trait::async_trait;
use conex_config::ConnectionDef;

/// External credential store.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
  /// Fetch a connection definition by id.
  async fn get_connection(&self, connection_id: &str) -> Result<ConnectionDef, ConnectionError>;
}
