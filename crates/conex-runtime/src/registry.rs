use std::sync::Arc;

use conex_config::NodeKind;

use crate::runner::NodeRunner;
use crate::runners::{
  DataTransformRunner, DocumentGenerationRunner, HttpCallRunner, MonitorRunner, TriggerRunner,
};

/// Maps each node kind to its runner.
///
/// The match is exhaustive, so adding a [`NodeKind`] without a runner does
/// not compile.
#[derive(Clone)]
pub struct RunnerRegistry {
  trigger: Arc<TriggerRunner>,
  http_call: Arc<HttpCallRunner>,
  document_generation: Arc<DocumentGenerationRunner>,
  data_transform: Arc<DataTransformRunner>,
  monitor: Arc<MonitorRunner>,
}

impl RunnerRegistry {
  pub fn new() -> Self {
    Self {
      trigger: Arc::new(TriggerRunner),
      http_call: Arc::new(HttpCallRunner),
      document_generation: Arc::new(DocumentGenerationRunner),
      data_transform: Arc::new(DataTransformRunner),
      monitor: Arc::new(MonitorRunner),
    }
  }

  pub fn get(&self, kind: NodeKind) -> Arc<dyn NodeRunner> {
    match kind {
      NodeKind::Trigger => self.trigger.clone(),
      NodeKind::HttpCall => self.http_call.clone(),
      NodeKind::DocumentGeneration => self.document_generation.clone(),
      NodeKind::DataTransform => self.data_transform.clone(),
      NodeKind::Monitor => self.monitor.clone(),
    }
  }
}

impl Default for RunnerRegistry {
  fn default() -> Self {
    Self::new()
  }
}
