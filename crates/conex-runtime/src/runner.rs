//! The node runner contract.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conex_config::RawConfig;
use conex_connection::ResolvedConnection;
use conex_host_http::HttpTransport;
use conex_template::{FieldPolicy, Scope, TemplateError, VarPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;

/// Classification of a node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
  #[serde(rename = "validation")]
  Validation,
  #[serde(rename = "network")]
  Network,
  #[serde(rename = "upstream-4xx")]
  Upstream4xx,
  #[serde(rename = "upstream-5xx")]
  Upstream5xx,
  #[serde(rename = "timeout")]
  Timeout,
  #[serde(rename = "mapping")]
  Mapping,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Validation => "validation",
      ErrorKind::Network => "network",
      ErrorKind::Upstream4xx => "upstream-4xx",
      ErrorKind::Upstream5xx => "upstream-5xx",
      ErrorKind::Timeout => "timeout",
      ErrorKind::Mapping => "mapping",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A typed node failure, recorded in the node's step result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RunnerError {
  pub kind: ErrorKind,
  pub message: String,
  pub retryable: bool,
}

impl RunnerError {
  pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
    Self {
      kind,
      message: message.into(),
      retryable,
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, message, false)
  }

  pub fn mapping(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Mapping, message, false)
  }

  /// Classify a non-2xx response. Status errors are never retryable.
  pub fn upstream(status: u16, message: impl Into<String>) -> Self {
    let kind = if status >= 500 {
      ErrorKind::Upstream5xx
    } else {
      ErrorKind::Upstream4xx
    };
    Self::new(kind, message, false)
  }
}

impl From<TemplateError> for RunnerError {
  fn from(err: TemplateError) -> Self {
    RunnerError::validation(err.to_string())
  }
}

impl From<conex_host_http::HttpError> for RunnerError {
  fn from(err: conex_host_http::HttpError) -> Self {
    use conex_host_http::HttpError;
    match &err {
      HttpError::Timeout { .. } => RunnerError::new(ErrorKind::Timeout, err.to_string(), true),
      HttpError::Network { .. } => RunnerError::new(ErrorKind::Network, err.to_string(), true),
      HttpError::InvalidRequest { .. } => RunnerError::validation(err.to_string()),
    }
  }
}

impl From<conex_connection::ConnectionError> for RunnerError {
  fn from(err: conex_connection::ConnectionError) -> Self {
    if let conex_connection::ConnectionError::TokenExchange { .. } = &err {
      return RunnerError::new(ErrorKind::Network, err.to_string(), err.is_retryable());
    }
    RunnerError::validation(err.to_string())
  }
}

/// Everything a runner may read while executing one node.
#[derive(Clone)]
pub struct RunContext {
  pub execution_id: String,
  pub node_id: String,
  /// Every node the node transitively depends on, in topological order.
  pub ancestors: Vec<String>,
  /// Snapshot of the execution context taken when the node became ready.
  pub context: Arc<ExecutionContext>,
  /// Connections referenced by the node, resolved for this run.
  pub connections: HashMap<String, Arc<ResolvedConnection>>,
  pub transport: Arc<dyn HttpTransport>,
  pub config: Arc<ExecutorConfig>,
}

impl RunContext {
  pub fn connection(&self, connection_id: &str) -> Option<&ResolvedConnection> {
    self.connections.get(connection_id).map(Arc::as_ref)
  }

  /// Outputs of every ancestor written so far, keyed `step_<id>`.
  pub fn ancestor_outputs(&self) -> serde_json::Map<String, Value> {
    self
      .ancestors
      .iter()
      .filter_map(|id| {
        self
          .context
          .step(id)
          .map(|output| (format!("step_{}", id), output.clone()))
      })
      .collect()
  }
}

impl Scope for RunContext {
  fn trigger(&self) -> Option<&Value> {
    self.context.trigger()
  }

  fn step(&self, node_id: &str) -> Option<&Value> {
    self.context.step(node_id)
  }

  fn connection(&self, connection_id: &str) -> Option<&Value> {
    self.connections.get(connection_id).map(|c| &c.view)
  }
}

/// Executable behaviour bound to a node kind.
///
/// The executor calls [`NodeRunner::validate`] on the raw config of every
/// node before the run starts, resolves templates in the config according
/// to [`NodeRunner::field_policy`], then calls [`NodeRunner::run`].
#[async_trait]
pub trait NodeRunner: Send + Sync {
  /// Check the raw (unresolved) config. Failures are configuration errors.
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError>;

  /// Which config fields are structural and which are not templated.
  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::TEXT
  }

  /// Context paths the node reads outside of templates.
  fn references(&self, _config: &RawConfig) -> Result<Vec<VarPath>, TemplateError> {
    Ok(Vec::new())
  }

  /// Connections the node needs outside of templates.
  fn connection_ids(&self, _config: &RawConfig) -> Vec<String> {
    Vec::new()
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError>;
}
