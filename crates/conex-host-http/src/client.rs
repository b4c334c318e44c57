use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::HttpTransport;
use crate::error::HttpError;
use crate::request::{Body, HttpRequest, HttpResponse};

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
  client: Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
    let url = request.url.to_string();
    let timeout = request.timeout;
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .timeout(request.timeout);

    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    builder = match request.body {
      Some(Body::Json(value)) => builder.json(&value),
      Some(Body::Text(text)) => builder.body(text),
      Some(Body::Form(fields)) => builder.form(&fields),
      None => builder,
    };

    debug!(method = %request.method, url = %url, "http_request");

    let response = builder
      .send()
      .await
      .map_err(|e| classify(e, &url, timeout))?;

    let status = response.status();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_ascii_lowercase(), val.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| classify(e, &url, timeout))?;

    debug!(url = %url, status = status.as_u16(), size = body.len(), "http_response");

    Ok(HttpResponse {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

fn classify(err: reqwest::Error, url: &str, timeout: Duration) -> HttpError {
  if err.is_timeout() {
    HttpError::Timeout {
      url: url.to_string(),
      timeout,
    }
  } else if err.is_builder() {
    HttpError::invalid_request(err.to_string())
  } else {
    HttpError::Network {
      url: url.to_string(),
      message: err.to_string(),
    }
  }
}
