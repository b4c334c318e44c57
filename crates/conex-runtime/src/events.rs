//! Execution events and notifiers for observability.
//!
//! Events are emitted while a flow runs so callers can stream progress to a
//! UI or persist it. They carry outputs and errors but never credentials.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::record::RunStatus;
use crate::runner::RunnerError;

/// Events emitted during flow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ExecutionEvent {
  FlowStarted {
    execution_id: String,
    flow_id: String,
  },

  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  NodeSucceeded {
    execution_id: String,
    node_id: String,
    output: serde_json::Value,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    error: RunnerError,
  },

  /// A predecessor failed so the node will not run.
  NodeSkipped {
    execution_id: String,
    node_id: String,
    blocked_by: String,
  },

  NodeCancelled {
    execution_id: String,
    node_id: String,
  },

  FlowFinished {
    execution_id: String,
    status: RunStatus,
  },
}

/// Receives execution events.
///
/// Called synchronously from the executor loop, so implementations should
/// hand events off rather than do slow work inline.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the run; volume is a handful
  // of events per node.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
