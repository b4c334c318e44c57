use std::fmt;

use serde::{Deserialize, Serialize};

/// Node configuration as authored in the editor.
///
/// String leaves may contain `{{ ... }}` placeholders. The shape is checked by
/// the runner registered for the node's kind.
pub type RawConfig = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  /// Display name shown in the editor.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default = "empty_config")]
  pub config: RawConfig,
}

fn empty_config() -> RawConfig {
  RawConfig::Object(serde_json::Map::new())
}

impl NodeDef {
  pub fn new(id: impl Into<String>, kind: NodeKind, config: RawConfig) -> Self {
    Self {
      id: id.into(),
      kind,
      name: None,
      config,
    }
  }
}

/// The closed set of node kinds the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
  Trigger,
  HttpCall,
  DocumentGeneration,
  DataTransform,
  Monitor,
}

impl NodeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Trigger => "trigger",
      NodeKind::HttpCall => "httpCall",
      NodeKind::DocumentGeneration => "documentGeneration",
      NodeKind::DataTransform => "dataTransform",
      NodeKind::Monitor => "monitor",
    }
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_node_kind_tags() {
    let node: NodeDef = serde_json::from_value(json!({
      "id": "fetch",
      "type": "httpCall",
      "config": { "method": "GET", "url": "https://example.com" }
    }))
    .unwrap();

    assert_eq!(node.kind, NodeKind::HttpCall);
    assert_eq!(node.config["method"], "GET");
  }

  #[test]
  fn test_missing_config_defaults_to_empty_object() {
    let node: NodeDef = serde_json::from_value(json!({ "id": "t", "type": "trigger" })).unwrap();
    assert_eq!(node.config, json!({}));
  }

  #[test]
  fn test_unknown_kind_rejected() {
    let result: Result<NodeDef, _> =
      serde_json::from_value(json!({ "id": "x", "type": "logicGate", "config": {} }));
    assert!(result.is_err());
  }
}
