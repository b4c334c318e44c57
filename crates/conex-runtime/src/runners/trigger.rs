use async_trait::async_trait;
use conex_config::RawConfig;
use conex_template::FieldPolicy;
use serde::Deserialize;
use serde_json::Value;

use super::parse_config;
use crate::runner::{NodeRunner, RunContext, RunnerError};
use crate::schema::InputSchema;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerConfig {
  #[serde(default)]
  input_schema: Option<Value>,
}

/// Entry point of every flow. Outputs the seed payload, optionally checked
/// against a declared input schema.
#[derive(Debug, Default)]
pub struct TriggerRunner;

impl TriggerRunner {
  fn schema(config: &RawConfig) -> Result<Option<InputSchema>, RunnerError> {
    let config: TriggerConfig = parse_config(config)?;
    config
      .input_schema
      .filter(|s| !s.is_null())
      .map(|s| InputSchema::from_json(&s).map_err(RunnerError::validation))
      .transpose()
  }
}

#[async_trait]
impl NodeRunner for TriggerRunner {
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError> {
    Self::schema(config).map(|_| ())
  }

  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::TEXT.with_verbatim(&["inputSchema"])
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError> {
    let input = ctx.context.input().clone();
    if let Some(schema) = Self::schema(&config)? {
      schema.check(&input).map_err(|violations| {
        RunnerError::validation(format!("trigger input rejected: {}", violations.join("; ")))
      })?;
    }
    Ok(input)
  }
}
