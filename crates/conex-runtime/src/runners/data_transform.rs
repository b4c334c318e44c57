use async_trait::async_trait;
use conex_config::RawConfig;
use conex_template::{FieldPath, FieldPolicy, Root, TemplateError, VarPath, lookup};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::parse_config;
use crate::runner::{NodeRunner, RunContext, RunnerError};

#[derive(Debug, Deserialize)]
struct TransformConfig {
  #[serde(default)]
  transformations: Vec<Transformation>,
}

#[derive(Debug, Deserialize)]
struct Transformation {
  #[serde(default = "default_type", rename = "type")]
  kind: String,
  /// Context path, with or without surrounding braces.
  source: String,
  #[serde(default)]
  target: Option<String>,
  /// Output field to path within the source.
  mapping: Map<String, Value>,
}

fn default_type() -> String {
  "map".to_string()
}

/// A transformation with its paths parsed.
struct Compiled {
  source: VarPath,
  target: Option<String>,
  fields: Vec<(String, FieldPath)>,
}

fn source_path(source: &str) -> Result<VarPath, TemplateError> {
  let trimmed = source.trim();
  let inner = trimmed
    .strip_prefix("{{")
    .and_then(|s| s.strip_suffix("}}"))
    .unwrap_or(trimmed);
  VarPath::parse(inner.trim())
}

fn compile(config: &RawConfig) -> Result<Vec<Compiled>, RunnerError> {
  let config: TransformConfig = parse_config(config)?;
  config
    .transformations
    .into_iter()
    .enumerate()
    .map(|(i, t)| {
      if t.kind != "map" {
        return Err(RunnerError::validation(format!(
          "transformations[{}]: unsupported type '{}'",
          i, t.kind
        )));
      }
      let source = source_path(&t.source)
        .map_err(|e| RunnerError::validation(format!("transformations[{}].source: {}", i, e)))?;
      // step outputs land in the record, credentials must not
      if let Root::Connection(id) = source.root() {
        return Err(RunnerError::validation(format!(
          "transformations[{}].source: connection '{}' cannot be a source",
          i, id
        )));
      }
      let fields = t
        .mapping
        .iter()
        .map(|(output, path)| {
          let path = path.as_str().ok_or_else(|| {
            RunnerError::validation(format!(
              "transformations[{}].mapping.{} must be a path string",
              i, output
            ))
          })?;
          let path = FieldPath::parse(path).map_err(|e| {
            RunnerError::validation(format!("transformations[{}].mapping.{}: {}", i, output, e))
          })?;
          Ok((output.clone(), path))
        })
        .collect::<Result<Vec<_>, RunnerError>>()?;
      let target = t.target.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
      Ok(Compiled {
        source,
        target,
        fields,
      })
    })
    .collect()
}

/// Reshapes values already in the context. Pure: the same context always
/// gives the same output.
///
/// ```json
/// { "transformations": [
///   { "type": "map", "source": "step_fetch", "target": "customer",
///     "mapping": { "displayName": "response.name", "tags": "response.tags[].label" } }
/// ] }
/// ```
#[derive(Debug, Default)]
pub struct DataTransformRunner;

#[async_trait]
impl NodeRunner for DataTransformRunner {
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError> {
    compile(config).map(|_| ())
  }

  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::TEXT.with_verbatim(&["transformations"])
  }

  fn references(&self, config: &RawConfig) -> Result<Vec<VarPath>, TemplateError> {
    let Ok(config) = parse_config::<TransformConfig>(config) else {
      return Ok(Vec::new());
    };
    config
      .transformations
      .iter()
      .map(|t| source_path(&t.source))
      .collect()
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError> {
    let mut output = Map::new();

    for transformation in compile(&config)? {
      let source = lookup(&transformation.source, ctx)
        .map_err(|e| RunnerError::mapping(e.to_string()))?
        .ok_or_else(|| {
          RunnerError::mapping(format!("source '{}' not found", transformation.source))
        })?;

      let mut mapped = Map::new();
      for (field, path) in &transformation.fields {
        let value = path
          .select(&source)
          .map_err(|e| RunnerError::mapping(format!("{}: {}", field, e)))?
          .ok_or_else(|| {
            RunnerError::mapping(format!(
              "{}: path '{}' not found in '{}'",
              field, path, transformation.source
            ))
          })?;
        mapped.insert(field.clone(), value);
      }

      match transformation.target {
        None => output.extend(mapped),
        Some(target) => match output.get_mut(&target) {
          Some(Value::Object(existing)) => existing.extend(mapped),
          _ => {
            output.insert(target, Value::Object(mapped));
          }
        },
      }
    }

    Ok(Value::Object(output))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runner::ErrorKind;
  use crate::runners::test_support::{Scripted, context_with, run_context};
  use serde_json::json;

  fn ctx_with_items() -> RunContext {
    run_context(
      Scripted::new(vec![]),
      context_with(
        json!({ "items": [{ "name": "a" }, { "name": "b" }] }),
        &[("fetch", json!({ "response": { "name": "Acme", "tier": 2 } }))],
      ),
      &["fetch"],
      vec![],
    )
  }

  #[tokio::test]
  async fn test_wildcard_and_index() {
    let config = json!({
      "transformations": [{
        "source": "trigger.input",
        "mapping": { "names": "items[].name", "first": "items[0].name" }
      }]
    });
    let output = DataTransformRunner.run(config, &ctx_with_items()).await.unwrap();
    assert_eq!(output, json!({ "names": ["a", "b"], "first": "a" }));
  }

  #[tokio::test]
  async fn test_entries_accumulate_under_targets() {
    let config = json!({
      "transformations": [
        { "type": "map", "source": "{{ step_fetch }}", "target": "customer",
          "mapping": { "name": "response.name" } },
        { "source": "step_fetch.response", "target": "customer",
          "mapping": { "tier": "tier" } },
        { "source": "trigger.input", "mapping": { "count": "items[1].name" } }
      ]
    });
    let output = DataTransformRunner.run(config, &ctx_with_items()).await.unwrap();
    assert_eq!(
      output,
      json!({ "customer": { "name": "Acme", "tier": 2 }, "count": "b" })
    );
  }

  #[tokio::test]
  async fn test_is_idempotent() {
    let ctx = ctx_with_items();
    let config = json!({
      "transformations": [{ "source": "step_fetch", "mapping": { "displayName": "response.name" } }]
    });
    let first = DataTransformRunner.run(config.clone(), &ctx).await.unwrap();
    let second = DataTransformRunner.run(config, &ctx).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, json!({ "displayName": "Acme" }));
  }

  #[tokio::test]
  async fn test_missing_path_is_mapping_error() {
    let config = json!({
      "transformations": [{ "source": "step_fetch", "mapping": { "x": "response.missing" } }]
    });
    let err = DataTransformRunner.run(config, &ctx_with_items()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mapping);
    assert!(!err.retryable);
  }

  #[tokio::test]
  async fn test_wildcard_over_object_is_mapping_error() {
    let config = json!({
      "transformations": [{ "source": "step_fetch", "mapping": { "x": "response[].name" } }]
    });
    let err = DataTransformRunner.run(config, &ctx_with_items()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mapping);
  }

  #[test]
  fn test_validate() {
    let runner = DataTransformRunner;
    assert!(runner.validate(&json!({ "transformations": [] })).is_ok());
    assert!(
      runner
        .validate(&json!({ "transformations": [{ "type": "filter", "source": "trigger.input", "mapping": {} }] }))
        .is_err()
    );
    assert!(
      runner
        .validate(&json!({ "transformations": [{ "source": "customer", "mapping": {} }] }))
        .is_err()
    );
    assert!(
      runner
        .validate(&json!({ "transformations": [{ "source": "trigger.input", "mapping": { "a": 1 } }] }))
        .is_err()
    );
  }

  #[test]
  fn test_connection_source_is_rejected() {
    let err = DataTransformRunner
      .validate(&json!({
        "transformations": [{ "source": "connections.crm", "mapping": { "pw": "password" } }]
      }))
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("connection 'crm'"));
  }

  #[test]
  fn test_references_are_sources() {
    let refs = DataTransformRunner
      .references(&json!({
        "transformations": [{ "source": "{{step_fetch.response}}", "mapping": {} }]
      }))
      .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].as_str(), "step_fetch.response");
  }
}
