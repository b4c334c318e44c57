//! Execution result types.

use chrono::{DateTime, Utc};
use conex_config::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runner::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
  Succeeded,
  Failed,
  /// Not run because a predecessor failed.
  Skipped,
  /// Not run, or interrupted, because the run was cancelled.
  Cancelled,
}

/// Outcome of one node. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
  pub node_id: String,
  pub node_type: NodeKind,
  pub status: StepStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<RunnerError>,
  /// For skipped nodes, the failed node that blocked them.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub blocked_by: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: DateTime<Utc>,
}

impl StepResult {
  pub fn is_succeeded(&self) -> bool {
    self.status == StepStatus::Succeeded
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
  Completed,
  /// At least one node failed and no independent branch survived.
  Failed,
  /// At least one node failed but an independent branch succeeded.
  Partial,
  Cancelled,
}

/// The only artifact handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
  pub execution_id: String,
  pub flow_id: String,
  pub status: RunStatus,
  /// Step results in the order they were written.
  pub steps: Vec<StepResult>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
  pub fn step(&self, node_id: &str) -> Option<&StepResult> {
    self.steps.iter().find(|s| s.node_id == node_id)
  }

  pub fn succeeded(&self) -> impl Iterator<Item = &StepResult> {
    self.steps.iter().filter(|s| s.is_succeeded())
  }
}
