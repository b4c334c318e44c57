use std::fmt;

use serde::{Deserialize, Serialize};

/// A stored connection to an external service.
///
/// Connections are owned by the external credential store. The engine only
/// reads them, keyed by the id referenced from node config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDef {
  pub id: String,
  /// Service type chosen in the editor, e.g. "rest" or "pandadoc".
  #[serde(rename = "type", default)]
  pub service: String,
  pub auth_type: AuthType,
  #[serde(default)]
  pub credentials: Credentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
  ApiKey,
  BearerToken,
  #[serde(rename = "oauth2")]
  OAuth2,
  CustomHeaders,
  BasicAuth,
}

impl AuthType {
  pub fn as_str(&self) -> &'static str {
    match self {
      AuthType::ApiKey => "apiKey",
      AuthType::BearerToken => "bearerToken",
      AuthType::OAuth2 => "oauth2",
      AuthType::CustomHeaders => "customHeaders",
      AuthType::BasicAuth => "basicAuth",
    }
  }
}

impl fmt::Display for AuthType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Opaque credential material.
///
/// `Debug` prints field names only so credentials can travel through
/// `tracing` spans and error values without leaking.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(serde_json::Map<String, serde_json::Value>);

impl Credentials {
  pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
    Self(fields)
  }

  /// Get a credential field rendered as a non-empty string.
  pub fn get_str(&self, field: &str) -> Option<String> {
    match self.0.get(field)? {
      serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
      serde_json::Value::Number(n) => Some(n.to_string()),
      serde_json::Value::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }

  pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
    &self.0
  }
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map()
      .entries(self.0.keys().map(|k| (k, "<redacted>")))
      .finish()
  }
}
