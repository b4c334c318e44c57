use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use conex_config::RawConfig;
use conex_template::{FieldPath, FieldPolicy};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use super::parse_config;
use crate::runner::{NodeRunner, RunContext, RunnerError};

const DEFAULT_NAME: &str = "Debug Monitor";
const TABLE_VALUE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OutputFormat {
  #[default]
  Json,
  Table,
  List,
}

impl OutputFormat {
  fn as_str(&self) -> &'static str {
    match self {
      OutputFormat::Json => "json",
      OutputFormat::Table => "table",
      OutputFormat::List => "list",
    }
  }
}

/// Either `"a, b.c"` or `["a", "b.c"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DisplayFields {
  Text(String),
  List(Vec<String>),
}

impl DisplayFields {
  fn paths(&self) -> Vec<String> {
    let raw: Vec<&str> = match self {
      DisplayFields::Text(text) => text.split(',').collect(),
      DisplayFields::List(items) => items.iter().map(String::as_str).collect(),
    };
    raw
      .into_iter()
      .map(str::trim)
      .filter(|p| !p.is_empty())
      .map(str::to_string)
      .collect()
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorConfig {
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  display_fields: Option<DisplayFields>,
  #[serde(default)]
  output_format: OutputFormat,
  #[serde(default, alias = "enableTimestamp")]
  include_timestamp: Option<bool>,
}

/// Captures the outputs of its predecessors for inspection.
///
/// Reads the context only and never fails at run time.
#[derive(Debug, Default)]
pub struct MonitorRunner;

#[async_trait]
impl NodeRunner for MonitorRunner {
  fn validate(&self, config: &RawConfig) -> Result<(), RunnerError> {
    let config: MonitorConfig = parse_config(config)?;
    if let Some(fields) = &config.display_fields {
      for path in fields.paths() {
        FieldPath::parse(&path).map_err(|e| RunnerError::validation(e.to_string()))?;
      }
    }
    Ok(())
  }

  fn field_policy(&self) -> FieldPolicy {
    FieldPolicy::TEXT.with_verbatim(&["displayFields"])
  }

  async fn run(&self, config: RawConfig, ctx: &RunContext) -> Result<Value, RunnerError> {
    let config: MonitorConfig = match parse_config(&config) {
      Ok(config) => config,
      Err(_) => MonitorConfig {
        name: None,
        display_fields: None,
        output_format: OutputFormat::Json,
        include_timestamp: None,
      },
    };
    let name = config
      .name
      .filter(|n| !n.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_NAME.to_string());

    let captured = Value::Object(ctx.ancestor_outputs());
    let paths = config
      .display_fields
      .as_ref()
      .map(DisplayFields::paths)
      .unwrap_or_default();

    let snapshot = if paths.is_empty() {
      captured
    } else {
      let mut projected = Map::new();
      for path in paths {
        let value = FieldPath::parse(&path)
          .ok()
          .and_then(|p| p.select(&captured).ok().flatten());
        if let Some(value) = value {
          projected.insert(path, value);
        }
      }
      Value::Object(projected)
    };

    let field_count = snapshot.as_object().map(Map::len).unwrap_or_default();
    let formatted = format_snapshot(&snapshot, config.output_format);

    info!(
      execution_id = %ctx.execution_id,
      node_id = %ctx.node_id,
      monitor = %name,
      field_count,
      "monitor_captured"
    );

    let mut output = Map::new();
    output.insert("monitorName".to_string(), json!(name));
    if config.include_timestamp.unwrap_or(true) {
      output.insert(
        "timestamp".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
      );
    }
    output.insert("format".to_string(), json!(config.output_format.as_str()));
    output.insert("fieldCount".to_string(), json!(field_count));
    output.insert("dataSnapshot".to_string(), snapshot);
    output.insert("formattedOutput".to_string(), json!(formatted));
    Ok(Value::Object(output))
  }
}

fn format_snapshot(snapshot: &Value, format: OutputFormat) -> String {
  let entries = match snapshot.as_object() {
    Some(map) if !map.is_empty() => map,
    _ if format == OutputFormat::Json => {
      return serde_json::to_string_pretty(snapshot).unwrap_or_default();
    }
    _ => return "No data".to_string(),
  };

  match format {
    OutputFormat::Json => serde_json::to_string_pretty(snapshot).unwrap_or_default(),
    OutputFormat::Table => {
      let mut table = String::from("Field\t\t\tValue\n");
      table.push_str(&"=".repeat(50));
      table.push('\n');
      for (key, value) in entries {
        let rendered = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        let truncated: String = rendered.chars().take(TABLE_VALUE_WIDTH).collect();
        table.push_str(&format!("{:<20}\t{}\n", key, truncated));
      }
      table
    }
    OutputFormat::List => entries
      .iter()
      .map(|(key, value)| {
        let rendered = match value {
          Value::String(s) => s.clone(),
          Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_default()
          }
          other => other.to_string(),
        };
        format!("• {}: {}", key, rendered)
      })
      .collect::<Vec<_>>()
      .join("\n"),
  }
}
