//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every run of a [`crate::FlowExecutor`].
///
/// Durations are expressed in milliseconds when (de)serialized:
///
/// ```json
/// {
///   "httpTimeoutMs": 30000,
///   "retry": { "maxAttempts": 3, "initialBackoffMs": 250, "maxBackoffMs": 5000 },
///   "maxConcurrency": 8
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
  /// Timeout for a single outbound request.
  #[serde(rename = "httpTimeoutMs", with = "duration_ms")]
  pub http_timeout: Duration,
  /// Retry policy for idempotent HTTP calls.
  pub retry: RetryPolicy,
  /// Upper bound on nodes running at the same time.
  pub max_concurrency: usize,
  /// Sent when a node does not set its own `User-Agent`.
  pub user_agent: String,
  /// Document API base used when a node does not set `baseUrl`.
  pub document_api_base_url: String,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      http_timeout: Duration::from_secs(30),
      retry: RetryPolicy::default(),
      max_concurrency: 8,
      user_agent: concat!("conex-flow/", env!("CARGO_PKG_VERSION")).to_string(),
      document_api_base_url: "https://api.pandadoc.com/public/v1".to_string(),
    }
  }
}

/// Exponential backoff for retryable HTTP failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
  /// Total attempts including the first one.
  pub max_attempts: u32,
  #[serde(rename = "initialBackoffMs", with = "duration_ms")]
  pub initial_backoff: Duration,
  #[serde(rename = "maxBackoffMs", with = "duration_ms")]
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_backoff: Duration::from_millis(250),
      max_backoff: Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  /// Ceiling on attempts, whatever the policy or a node asks for.
  pub const ATTEMPT_LIMIT: u32 = 5;

  /// Attempts for a request, honouring a node's `retries` override.
  pub fn attempts(&self, retries: Option<u32>) -> u32 {
    let wanted = match retries {
      Some(retries) => retries.saturating_add(1),
      None => self.max_attempts,
    };
    wanted.clamp(1, Self::ATTEMPT_LIMIT)
  }

  /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    self
      .initial_backoff
      .saturating_mul(1u32 << exponent)
      .min(self.max_backoff)
  }
}

mod duration_ms {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}
