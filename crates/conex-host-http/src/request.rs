use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::error::HttpError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
  /// Serialized as JSON with `Content-Type: application/json`.
  Json(Value),
  /// Sent as-is.
  Text(String),
  /// `application/x-www-form-urlencoded`.
  Form(Vec<(String, String)>),
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  /// Header names are compared case-insensitively; a later value replaces an
  /// earlier one.
  pub headers: Vec<(String, String)>,
  pub body: Option<Body>,
  pub timeout: Duration,
}

impl HttpRequest {
  pub fn new(method: Method, url: &str) -> Result<Self, HttpError> {
    let url = Url::parse(url)
      .map_err(|e| HttpError::invalid_request(format!("invalid url '{}': {}", url, e)))?;
    match url.scheme() {
      "http" | "https" => {}
      other => {
        return Err(HttpError::invalid_request(format!(
          "unsupported url scheme '{}'",
          other
        )));
      }
    }
    Ok(Self {
      method,
      url,
      headers: Vec::new(),
      body: None,
      timeout: DEFAULT_TIMEOUT,
    })
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.set_header(name, value);
    self
  }

  /// Set a header, replacing any existing header with the same name.
  pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
    self.headers.push((name, value.into()));
  }

  pub fn get_header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body(mut self, body: Body) -> Self {
    self.body = Some(body);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

/// A received response. Header names are lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16) -> Self {
    let status_text = StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();
    Self {
      status,
      status_text,
      headers: BTreeMap::new(),
      body: Vec::new(),
    }
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.into());
    self
  }

  /// JSON body with a matching content type.
  pub fn with_json(self, value: &Value) -> Self {
    let mut response = self.with_header("content-type", "application/json");
    response.body = value.to_string().into_bytes();
    response
  }

  pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    self = self.with_header("content-type", content_type);
    self.body = body.into();
    self
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("content-type").map(String::as_str)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  pub fn json(&self) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(&self.body)
  }

  /// Decode the body according to its content type.
  ///
  /// - JSON types parse to the JSON value (`{"text": ...}` if the body is
  ///   not valid JSON)
  /// - `text/*` and XML types become `{"text": ...}`
  /// - anything else becomes `{"binary": true, "size": n, "contentType": ...}`
  ///
  /// Without a content type, a body that parses as JSON is returned as JSON
  /// and an empty body becomes `null`.
  pub fn parsed_body(&self) -> Value {
    let content_type = self.content_type().unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("json") {
      return self.json().unwrap_or_else(|_| json!({ "text": self.text() }));
    }
    if content_type.starts_with("text/") || content_type.contains("xml") {
      return json!({ "text": self.text() });
    }
    if content_type.is_empty() {
      if self.body.is_empty() {
        return Value::Null;
      }
      if let Ok(value) = self.json() {
        return value;
      }
    }

    let content_type = if content_type.is_empty() {
      "application/octet-stream".to_string()
    } else {
      content_type
    };
    json!({
      "binary": true,
      "size": self.body.len(),
      "contentType": content_type,
    })
  }
}

/// Parse an HTTP method name, case-insensitively.
pub fn parse_method(method: &str) -> Result<Method, HttpError> {
  match method.trim().to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(HttpError::invalid_request(format!(
      "unsupported HTTP method: {}",
      method
    ))),
  }
}
