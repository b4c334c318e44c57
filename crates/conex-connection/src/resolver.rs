use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use conex_config::{AuthType, ConnectionDef};
use conex_host_http::HttpTransport;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument};

use crate::ConnectionProvider;
use crate::auth::auth_headers;
use crate::error::ConnectionError;
use crate::oauth::exchange_client_credentials;

/// A connection ready to be injected into a request.
#[derive(Clone)]
pub struct ResolvedConnection {
  pub id: String,
  pub auth_type: AuthType,
  /// Auth headers to merge into outbound requests.
  pub headers: Vec<(String, String)>,
  /// What `{{ connections.<id>.* }}` sees: every credential field plus
  /// `headers` and `authType`.
  pub view: Value,
}

impl fmt::Debug for ResolvedConnection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResolvedConnection")
      .field("id", &self.id)
      .field("auth_type", &self.auth_type)
      .field(
        "headers",
        &self.headers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
      )
      .finish_non_exhaustive()
  }
}

impl ResolvedConnection {
  fn new(conn: &ConnectionDef, headers: Vec<(String, String)>) -> Self {
    let mut view: Map<String, Value> = conn.credentials.fields().clone();
    let header_map: Map<String, Value> = headers
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect();
    view.insert("headers".to_string(), Value::Object(header_map));
    view.insert(
      "authType".to_string(),
      Value::String(conn.auth_type.as_str().to_string()),
    );

    Self {
      id: conn.id.clone(),
      auth_type: conn.auth_type,
      headers,
      view: Value::Object(view),
    }
  }
}

/// Run-scoped connection resolver.
///
/// Each connection is fetched from the provider at most once per run and
/// OAuth2 tokens are exchanged at most once per run. Failures are not cached.
/// Concurrent resolutions wait on each other only for the same connection id.
pub struct ConnectionResolver {
  provider: Arc<dyn ConnectionProvider>,
  transport: Arc<dyn HttpTransport>,
  token_timeout: Duration,
  cache: Mutex<HashMap<String, Arc<OnceCell<Arc<ResolvedConnection>>>>>,
}

impl ConnectionResolver {
  pub fn new(
    provider: Arc<dyn ConnectionProvider>,
    transport: Arc<dyn HttpTransport>,
    token_timeout: Duration,
  ) -> Self {
    Self {
      provider,
      transport,
      token_timeout,
      cache: Mutex::new(HashMap::new()),
    }
  }

  #[instrument(name = "resolve_connection", skip(self))]
  pub async fn resolve(
    &self,
    connection_id: &str,
  ) -> Result<Arc<ResolvedConnection>, ConnectionError> {
    let cell = {
      let mut cache = self.cache.lock().await;
      cache
        .entry(connection_id.to_string())
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone()
    };
    cell
      .get_or_try_init(|| self.load(connection_id))
      .await
      .cloned()
  }

  async fn load(&self, connection_id: &str) -> Result<Arc<ResolvedConnection>, ConnectionError> {
    let conn = self.provider.get_connection(connection_id).await?;
    let token = match conn.auth_type {
      AuthType::OAuth2 => {
        Some(exchange_client_credentials(self.transport.as_ref(), &conn, self.token_timeout).await?)
      }
      _ => None,
    };
    let headers = auth_headers(&conn, token.as_deref())?;

    debug!(
      connection_id = %conn.id,
      auth_type = %conn.auth_type,
      header_count = headers.len(),
      "connection_resolved"
    );

    Ok(Arc::new(ResolvedConnection::new(&conn, headers)))
  }
}
