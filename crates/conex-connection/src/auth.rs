use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use conex_config::{AuthType, ConnectionDef};
use serde_json::Value;

use crate::error::ConnectionError;

const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// Derive the auth headers for a connection that needs no network exchange.
///
/// OAuth2 connections need a token first; pass it as `oauth_token`.
pub fn auth_headers(
  conn: &ConnectionDef,
  oauth_token: Option<&str>,
) -> Result<Vec<(String, String)>, ConnectionError> {
  let creds = &conn.credentials;
  let require = |field: &str| {
    creds
      .get_str(field)
      .ok_or_else(|| ConnectionError::missing(&conn.id, field))
  };

  match conn.auth_type {
    AuthType::ApiKey => {
      let key = require("apiKey")?;
      let header = creds
        .get_str("apiKeyHeader")
        .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string());
      let value = match creds.get_str("apiKeyPrefix") {
        Some(prefix) => format!("{} {}", prefix, key),
        None => key,
      };
      Ok(vec![(header, value)])
    }
    AuthType::BearerToken => {
      let token = require("bearerToken")?;
      let header = creds
        .get_str("tokenHeader")
        .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string());
      Ok(vec![(header, format!("Bearer {}", token))])
    }
    AuthType::BasicAuth => {
      let username = require("username")?;
      let password = require("password")?;
      let encoded = STANDARD.encode(format!("{}:{}", username, password));
      Ok(vec![(
        DEFAULT_AUTH_HEADER.to_string(),
        format!("Basic {}", encoded),
      )])
    }
    AuthType::CustomHeaders => match creds.fields().get("customHeaders") {
      Some(Value::String(text)) => Ok(parse_custom_headers(text)),
      Some(Value::Object(map)) => Ok(
        map
          .iter()
          .filter_map(|(k, v)| {
            let value = v.as_str()?.trim();
            (!k.trim().is_empty() && !value.is_empty())
              .then(|| (k.trim().to_string(), value.to_string()))
          })
          .collect(),
      ),
      Some(_) => Err(ConnectionError::InvalidCredential {
        connection_id: conn.id.clone(),
        message: "customHeaders must be text or an object".to_string(),
      }),
      None => Err(ConnectionError::missing(&conn.id, "customHeaders")),
    },
    AuthType::OAuth2 => {
      let token = oauth_token.ok_or_else(|| ConnectionError::missing(&conn.id, "access_token"))?;
      Ok(vec![(
        DEFAULT_AUTH_HEADER.to_string(),
        format!("Bearer {}", token),
      )])
    }
  }
}

/// Parse `Name: Value` lines.
///
/// Lines without a colon, or with an empty name or value, are ignored. Values
/// may contain further colons.
pub fn parse_custom_headers(text: &str) -> Vec<(String, String)> {
  text
    .lines()
    .filter_map(|line| {
      let (name, value) = line.split_once(':')?;
      let (name, value) = (name.trim(), value.trim());
      if name.is_empty() || value.is_empty() {
        return None;
      }
      Some((name.to_string(), value.to_string()))
    })
    .collect()
}
