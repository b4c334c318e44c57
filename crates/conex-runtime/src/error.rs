//! Runtime error types.

use conex_flow::FlowError;
use conex_template::TemplateError;

/// A flow that cannot be run. Detected before any node executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  /// Invalid graph structure.
  #[error("invalid graph: {0}")]
  Graph(#[from] FlowError),

  /// Node config failed its runner's schema.
  #[error("invalid config for node '{node_id}': {message}")]
  NodeConfig { node_id: String, message: String },

  /// Malformed template or unknown root in node config.
  #[error("template error in node '{node_id}': {source}")]
  Template {
    node_id: String,
    #[source]
    source: TemplateError,
  },

  /// A `step_<id>` reference to a node that does not run before this one.
  #[error("node '{node_id}' references '{reference}' but '{step_id}' is not upstream of it")]
  NotUpstream {
    node_id: String,
    step_id: String,
    reference: String,
  },
}

/// Errors returned by [`crate::FlowExecutor::execute`].
///
/// Failures of individual nodes are not errors here; they are recorded in
/// the returned [`crate::ExecutionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),
}

impl From<FlowError> for ExecutionError {
  fn from(err: FlowError) -> Self {
    ExecutionError::Config(ConfigError::Graph(err))
  }
}
