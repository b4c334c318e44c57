//! Per-run execution context.

use std::sync::Arc;

use conex_template::Scope;
use indexmap::IndexMap;
use serde_json::{Value, json};

/// The accumulating namespaces of one run.
///
/// Step outputs are append-only and kept in completion order. Cloning is
/// cheap: outputs are shared, so each node task gets its own snapshot.
/// Connections are not stored here; they are resolved per node and exposed
/// through [`crate::RunContext`].
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  trigger: Arc<Value>,
  steps: IndexMap<String, Arc<Value>>,
}

impl ExecutionContext {
  pub fn new(seed: Value) -> Self {
    Self {
      trigger: Arc::new(json!({ "input": seed })),
      steps: IndexMap::new(),
    }
  }

  /// The seed payload.
  pub fn input(&self) -> &Value {
    &self.trigger["input"]
  }

  /// Record a completed node's output.
  ///
  /// Returns `false` and leaves the context untouched when the node already
  /// has an output.
  pub fn insert_step(&mut self, node_id: impl Into<String>, output: Value) -> bool {
    let node_id = node_id.into();
    if self.steps.contains_key(&node_id) {
      return false;
    }
    self.steps.insert(node_id, Arc::new(output));
    true
  }

  /// Completed node ids in completion order.
  pub fn completed(&self) -> impl Iterator<Item = &str> {
    self.steps.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}

impl Scope for ExecutionContext {
  fn trigger(&self) -> Option<&Value> {
    Some(&self.trigger)
  }

  fn step(&self, node_id: &str) -> Option<&Value> {
    self.steps.get(node_id).map(Arc::as_ref)
  }

  fn connection(&self, _connection_id: &str) -> Option<&Value> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use conex_template::{Strictness, resolve_str};

  #[test]
  fn test_steps_are_append_only() {
    let mut ctx = ExecutionContext::new(json!({ "id": 42 }));
    assert!(ctx.insert_step("fetch", json!({ "v": 1 })));
    assert!(!ctx.insert_step("fetch", json!({ "v": 2 })));
    assert_eq!(ctx.step("fetch"), Some(&json!({ "v": 1 })));
    assert_eq!(ctx.completed().collect::<Vec<_>>(), vec!["fetch"]);
  }

  #[test]
  fn test_snapshot_is_isolated() {
    let mut ctx = ExecutionContext::new(json!({}));
    let snapshot = ctx.clone();
    ctx.insert_step("later", json!(1));
    assert!(snapshot.step("later").is_none());
  }

  #[test]
  fn test_trigger_input_namespace() {
    let ctx = ExecutionContext::new(json!({ "id": 42 }));
    assert_eq!(ctx.input(), &json!({ "id": 42 }));
    assert_eq!(
      resolve_str("{{ trigger.input.id }}", &ctx, Strictness::Structural).unwrap(),
      json!(42)
    );
  }
}
