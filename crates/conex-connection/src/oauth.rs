use std::time::Duration;

use conex_config::ConnectionDef;
use conex_host_http::{Body, HttpRequest, HttpTransport, Method};
use tracing::debug;

use crate::error::ConnectionError;

/// Run the OAuth2 client-credentials grant and return the access token.
pub async fn exchange_client_credentials(
  transport: &dyn HttpTransport,
  conn: &ConnectionDef,
  timeout: Duration,
) -> Result<String, ConnectionError> {
  let creds = &conn.credentials;
  let field = |name: &str| {
    creds
      .get_str(name)
      .ok_or_else(|| ConnectionError::missing(&conn.id, name))
  };
  let token_url = field("tokenUrl")?;
  let client_id = field("clientId")?;
  let client_secret = field("clientSecret")?;

  let mut form = vec![
    ("grant_type".to_string(), "client_credentials".to_string()),
    ("client_id".to_string(), client_id),
    ("client_secret".to_string(), client_secret),
  ];
  if let Some(scope) = creds.get_str("scope") {
    form.push(("scope".to_string(), scope));
  }

  let request = HttpRequest::new(Method::POST, &token_url)
    .map_err(|e| ConnectionError::InvalidCredential {
      connection_id: conn.id.clone(),
      message: e.to_string(),
    })?
    .header("Accept", "application/json")
    .body(Body::Form(form))
    .timeout(timeout);

  debug!(connection_id = %conn.id, "oauth_token_request");

  let response = transport
    .send(request)
    .await
    .map_err(|e| ConnectionError::TokenExchange {
      connection_id: conn.id.clone(),
      message: e.to_string(),
      retryable: e.is_retryable(),
    })?;

  if !response.is_success() {
    return Err(ConnectionError::TokenExchange {
      connection_id: conn.id.clone(),
      message: format!("token endpoint returned {}", response.status),
      retryable: response.status >= 500,
    });
  }

  response
    .json()
    .ok()
    .and_then(|body| body.get("access_token")?.as_str().map(str::to_string))
    .ok_or_else(|| ConnectionError::TokenExchange {
      connection_id: conn.id.clone(),
      message: "response has no access_token".to_string(),
      retryable: false,
    })
}
