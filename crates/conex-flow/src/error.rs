use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  #[error("flow has no nodes")]
  Empty,

  #[error("invalid node id '{node_id}': {reason}")]
  InvalidNodeId { node_id: String, reason: String },

  #[error("duplicate node id: {0}")]
  DuplicateNodeId(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("edge from '{0}' to itself")]
  SelfLoop(String),

  #[error("flow must have exactly one trigger, found {0}")]
  TriggerCount(usize),

  #[error("trigger '{0}' must not have incoming edges")]
  TriggerHasPredecessor(String),

  #[error("node '{0}' has no incoming edges but is not a trigger (orphan node)")]
  Orphan(String),

  #[error("cycle detected in flow graph involving: {}", .0.join(", "))]
  CycleDetected(Vec<String>),
}
