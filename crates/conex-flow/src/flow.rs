use conex_config::{FlowDef, NodeKind, RawConfig};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::FlowError;
use crate::graph::Graph;

/// Characters that would make `step_<id>` unaddressable from a template path.
const RESERVED_ID_CHARS: &[char] = &['.', '[', ']', '{', '}'];

/// A node of a locked flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
  pub id: String,
  pub kind: NodeKind,
  pub name: Option<String>,
  pub config: RawConfig,
}

/// A locked flow ready for execution.
///
/// Built once per run from a [`FlowDef`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Flow {
  pub id: String,
  pub name: Option<String>,
  nodes: IndexMap<String, Node>,
  edges: Vec<(String, String)>,
  graph: Graph,
  order: Vec<String>,
  trigger_id: String,
}

impl Flow {
  /// Validate a definition and lock it.
  pub fn from_def(def: FlowDef) -> Result<Self, FlowError> {
    if def.nodes.is_empty() {
      return Err(FlowError::Empty);
    }

    let mut nodes = IndexMap::with_capacity(def.nodes.len());
    for node_def in def.nodes {
      validate_node_id(&node_def.id)?;
      if nodes.contains_key(&node_def.id) {
        return Err(FlowError::DuplicateNodeId(node_def.id));
      }
      nodes.insert(
        node_def.id.clone(),
        Node {
          id: node_def.id,
          kind: node_def.kind,
          name: node_def.name,
          config: node_def.config,
        },
      );
    }

    let mut edges = Vec::with_capacity(def.edges.len());
    for edge in def.edges {
      if !nodes.contains_key(&edge.source) || !nodes.contains_key(&edge.target) {
        return Err(FlowError::InvalidEdge {
          from: edge.source,
          to: edge.target,
        });
      }
      if edge.source == edge.target {
        return Err(FlowError::SelfLoop(edge.source));
      }
      edges.push((edge.source, edge.target));
    }

    let triggers: Vec<&String> = nodes
      .values()
      .filter(|n| n.kind == NodeKind::Trigger)
      .map(|n| &n.id)
      .collect();
    if triggers.len() != 1 {
      return Err(FlowError::TriggerCount(triggers.len()));
    }
    let trigger_id = triggers[0].clone();

    let graph = Graph::new(nodes.keys().map(String::as_str), &edges);

    if !graph.upstream(&trigger_id).is_empty() {
      return Err(FlowError::TriggerHasPredecessor(trigger_id));
    }

    let order = graph.topological_order()?;

    if let Some(orphan) = graph.entry_points().iter().find(|id| **id != trigger_id) {
      return Err(FlowError::Orphan(orphan.clone()));
    }

    Ok(Self {
      id: def.id,
      name: def.name,
      nodes,
      edges,
      graph,
      order,
      trigger_id,
    })
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// Nodes in definition order.
  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.nodes.values()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn edges(&self) -> &[(String, String)] {
    &self.edges
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Node ids in a topological order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// The single entry point of the flow.
  pub fn trigger(&self) -> &Node {
    &self.nodes[&self.trigger_id]
  }
}

impl TryFrom<FlowDef> for Flow {
  type Error = FlowError;

  fn try_from(def: FlowDef) -> Result<Self, Self::Error> {
    Flow::from_def(def)
  }
}

fn validate_node_id(node_id: &str) -> Result<(), FlowError> {
  let reason = if node_id.is_empty() {
    Some("must not be empty".to_string())
  } else if let Some(c) = node_id
    .chars()
    .find(|c| RESERVED_ID_CHARS.contains(c) || c.is_whitespace())
  {
    Some(format!("contains reserved character {:?}", c))
  } else {
    None
  };

  match reason {
    Some(reason) => Err(FlowError::InvalidNodeId {
      node_id: node_id.to_string(),
      reason,
    }),
    None => Ok(()),
  }
}
