use std::time::Duration;

use async_trait::async_trait;
use conex_config::RawConfig;
use conex_host_http::{Body, HttpRequest, HttpResponse, Method, parse_method};
use conex_template::{FieldPolicy, stringify};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{has_template, parse_config};
use crate::runner::{NodeRunner, RunContext, RunnerError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpCallConfig {
  #[serde(default)]
  connection_id: Option<String>,
  #[serde(default = "default_method")]
  method: String,
  url: String,
  #[serde(default)]
  headers: Map<String, Value>,
  #[serde(default)]
  body: Option<Value>,
  #[serde(default)]
  timeout_secs: Option<u64>,
  /// Extra attempts for idempotent requests. Overrides the executor policy.
  #[serde(default)]
  retries: Option<u32>,
}

fn default_method() -> String {
  "GET".to_string()
}

impl HttpCallConfig {
  fn connection_id(&self) -> Option<&str> {
    self.connection_id.as_deref().filter(|id| !id.trim().is_empty())
  }
}

/// Calls an external HTTP endpoint, optionally authenticated through a
/// stored connection.
///
/// Output:
///
/// ```json
/// { "status": 200, "statusText": "OK", "headers": {}, "response": {},
///   "url": "...", "method": "GET", "attempts": 1 }
/// ```
#[derive(Debug, Default)]
pub struct HttpCallRunner;

impl HttpCallRunner {
  fn build_request(
    &self,
    config: &HttpCallConfig,
    ctx: &RunContext,
  ) -> Result<HttpRequest, RunnerError> {
    let method = parse_method(&config.method)?;
    let timeout = config
      .timeout_secs
      .map(Duration::from_secs)
      .unwrap_or(ctx.config.http_timeout);
    let mut request = HttpRequest::new(method.clone(), config.url.trim())?.timeout(timeout);

    for (name, value) in &config.headers {
      request.set_header(name.clone(), stringify(value));
    }
    if let Some(connection_id) = config.connection_id() {
      let connection = ctx.connection(connection_id).ok_or_else(|| {
        RunnerError::validation(format!("connection '{}' is not available", connection_id))
      })?;
      for (name, value) in &connection.headers {
        request.set_header(name.clone(), value.clone());
      }
    }
    if request.get_header("user-agent").is_none() {
      request.set_header("User-Agent", ctx.config.user_agent.clone());
    }

    if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
      match &config.body {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => request = request.body(Body::Text(text.clone())),
        Some(other) => request = request.body(Body::Json(other.clone())),
      }
    }
    Ok(request)
  }

  fn max_attempts(config: &HttpCallConfig, ctx: &RunContext) -> u32 {
    ctx.config.retry.attempts(config.retries)
  }
}

#[async_trait]
impl NodeRunner for HttpCallRunner {
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError> {
    let config: HttpCallConfig = parse_config(config)?;
    if config.url.trim().is_empty() {
      return Err(RunnerError::validation("url is required"));
    }
    if !has_template(&config.method) {
      parse_method(&config.method)?;
    }
    if config.timeout_secs == Some(0) {
      return Err(RunnerError::validation("timeoutSecs must be positive"));
    }
    Ok(())
  }

  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::new(&["url", "method"]).with_verbatim(&["connectionId"])
  }

  fn connection_ids(&self, config: &RawConfig) -> Vec<String> {
    parse_config::<HttpCallConfig>(config)
      .ok()
      .and_then(|c| c.connection_id().map(str::to_string))
      .into_iter()
      .collect()
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError> {
    let config: HttpCallConfig = parse_config(&config)?;
    let request = self.build_request(&config, ctx)?;
    let idempotent = matches!(request.method, Method::GET | Method::HEAD | Method::OPTIONS);
    let max_attempts = Self::max_attempts(&config, ctx);

    let mut attempt = 1;
    let response: HttpResponse = loop {
      match ctx.transport.send(request.clone()).await {
        Ok(response) => break response,
        Err(err) if idempotent && err.is_retryable() && attempt < max_attempts => {
          let delay = ctx.config.retry.backoff(attempt);
          warn!(
            execution_id = %ctx.execution_id,
            node_id = %ctx.node_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "http_retry"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err.into()),
      }
    };

    debug!(
      execution_id = %ctx.execution_id,
      node_id = %ctx.node_id,
      status = response.status,
      attempts = attempt,
      "http_call_completed"
    );

    if !response.is_success() {
      let detail = response.text();
      let detail: String = detail.chars().take(200).collect();
      return Err(RunnerError::upstream(
        response.status,
        format!(
          "{} {} returned {} {}: {}",
          request.method, request.url, response.status, response.status_text, detail
        ),
      ));
    }

    Ok(json!({
      "status": response.status,
      "statusText": response.status_text,
      "headers": response.headers,
      "response": response.parsed_body(),
      "url": request.url.as_str(),
      "method": request.method.as_str(),
      "attempts": attempt,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RetryPolicy;
  use crate::runner::ErrorKind;
  use crate::runners::test_support::{Scripted, context_with, run_context};
  use conex_config::AuthType;
  use conex_connection::ResolvedConnection;
  use conex_host_http::HttpError;

  fn timeout_error() -> HttpError {
    HttpError::Timeout {
      url: "https://api.example.com".to_string(),
      timeout: Duration::from_secs(1),
    }
  }

  #[tokio::test]
  async fn test_get_returns_parsed_body() {
    let transport = Scripted::new(vec![Ok(
      HttpResponse::new(200).with_json(&json!({ "name": "Acme" })),
    )]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let output = HttpCallRunner
      .run(json!({ "url": "https://api.example.com/c/42" }), &ctx)
      .await
      .unwrap();

    assert_eq!(output["status"], json!(200));
    assert_eq!(output["response"], json!({ "name": "Acme" }));
    assert_eq!(output["attempts"], json!(1));
    assert_eq!(output["method"], json!("GET"));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.is_none());
    assert!(sent[0].get_header("user-agent").unwrap().starts_with("conex-flow/"));
  }

  #[tokio::test]
  async fn test_connection_headers_override_user_headers() {
    let transport = Scripted::new(vec![Ok(HttpResponse::new(201))]);
    let connection = ResolvedConnection {
      id: "crm".to_string(),
      auth_type: AuthType::BearerToken,
      headers: vec![("Authorization".to_string(), "Bearer secret".to_string())],
      view: json!({}),
    };
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![connection]);

    HttpCallRunner
      .run(
        json!({
          "connectionId": "crm",
          "method": "POST",
          "url": "https://api.example.com/deals",
          "headers": { "authorization": "Bearer mine", "X-Count": 3 },
          "body": { "amount": 10 }
        }),
        &ctx,
      )
      .await
      .unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].get_header("Authorization"), Some("Bearer secret"));
    assert_eq!(sent[0].get_header("x-count"), Some("3"));
    assert_eq!(sent[0].body, Some(Body::Json(json!({ "amount": 10 }))));
  }

  #[tokio::test]
  async fn test_upstream_status_is_not_retried() {
    let transport = Scripted::new(vec![
      Ok(HttpResponse::new(503)),
      Ok(HttpResponse::new(200)),
    ]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let err = HttpCallRunner
      .run(json!({ "url": "https://api.example.com" }), &ctx)
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Upstream5xx);
    assert!(!err.retryable);
    assert_eq!(transport.sent().len(), 1);
  }

  #[tokio::test]
  async fn test_not_found_is_upstream_4xx() {
    let transport = Scripted::new(vec![Ok(HttpResponse::new(404))]);
    let ctx = run_context(transport, context_with(json!({}), &[]), &[], vec![]);

    let err = HttpCallRunner
      .run(json!({ "url": "https://api.example.com" }), &ctx)
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Upstream4xx);
    assert!(!err.retryable);
  }

  #[tokio::test(start_paused = true)]
  async fn test_get_retries_on_timeout() {
    let transport = Scripted::new(vec![
      Err(timeout_error()),
      Err(timeout_error()),
      Ok(HttpResponse::new(200).with_json(&json!({ "ok": true }))),
    ]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let output = HttpCallRunner
      .run(json!({ "url": "https://api.example.com" }), &ctx)
      .await
      .unwrap();

    assert_eq!(output["attempts"], json!(3));
    assert_eq!(transport.sent().len(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_post_is_not_retried() {
    let transport = Scripted::new(vec![Err(timeout_error()), Ok(HttpResponse::new(200))]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let err = HttpCallRunner
      .run(json!({ "method": "POST", "url": "https://api.example.com" }), &ctx)
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.retryable);
    assert_eq!(transport.sent().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_zero_disables_retry() {
    let transport = Scripted::new(vec![Err(timeout_error()), Ok(HttpResponse::new(200))]);
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let err = HttpCallRunner
      .run(json!({ "url": "https://api.example.com", "retries": 0 }), &ctx)
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(transport.sent().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_large_retries_are_capped() {
    let transport = Scripted::new((0..8).map(|_| Err(timeout_error())).collect());
    let ctx = run_context(transport.clone(), context_with(json!({}), &[]), &[], vec![]);

    let err = HttpCallRunner
      .run(json!({ "url": "https://api.example.com", "retries": 4294967295u32 }), &ctx)
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(transport.sent().len(), RetryPolicy::ATTEMPT_LIMIT as usize);
  }

  #[test]
  fn test_validate() {
    let runner = HttpCallRunner;
    assert!(runner.validate(&json!({ "url": "https://x.test" })).is_ok());
    assert!(runner.validate(&json!({ "url": "{{ trigger.input.url }}", "method": "{{ trigger.input.m }}" })).is_ok());
    assert!(runner.validate(&json!({ "method": "GET" })).is_err());
    assert!(runner.validate(&json!({ "url": "https://x.test", "method": "FETCH PLEASE" })).is_err());
    assert!(runner.validate(&json!({ "url": "https://x.test", "headers": "nope" })).is_err());
  }

  #[test]
  fn test_connection_ids() {
    let runner = HttpCallRunner;
    assert_eq!(runner.connection_ids(&json!({ "url": "u", "connectionId": "crm" })), vec!["crm"]);
    assert!(runner.connection_ids(&json!({ "url": "u", "connectionId": "" })).is_empty());
  }
}
