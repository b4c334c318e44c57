//! Runners for the closed set of node kinds.

mod data_transform;
mod document;
mod http_call;
mod monitor;
mod trigger;

pub use data_transform::DataTransformRunner;
pub use document::DocumentGenerationRunner;
pub use http_call::HttpCallRunner;
pub use monitor::MonitorRunner;
pub use trigger::TriggerRunner;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::runner::RunnerError;

/// Deserialize a node config into its typed shape.
fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, RunnerError> {
  serde_json::from_value(config.clone()).map_err(|e| RunnerError::validation(e.to_string()))
}

fn has_template(value: &str) -> bool {
  value.contains("{{")
}
