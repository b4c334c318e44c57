//! Minimal JSON Schema checks for trigger input and numeric coercion for
//! runner fields.
//!
//! Only simple object schemas are understood:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": { "id": { "type": "integer" }, "email": { "type": "string" } },
//!   "required": ["id"]
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

/// JSON Schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
  String,
  Number,
  Integer,
  Boolean,
  Null,
  Array,
  Object,
}

impl SchemaType {
  pub fn parse(type_str: &str) -> Option<Self> {
    match type_str {
      "string" => Some(SchemaType::String),
      "number" => Some(SchemaType::Number),
      "integer" => Some(SchemaType::Integer),
      "boolean" => Some(SchemaType::Boolean),
      "null" => Some(SchemaType::Null),
      "array" => Some(SchemaType::Array),
      "object" => Some(SchemaType::Object),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      SchemaType::String => "string",
      SchemaType::Number => "number",
      SchemaType::Integer => "integer",
      SchemaType::Boolean => "boolean",
      SchemaType::Null => "null",
      SchemaType::Array => "array",
      SchemaType::Object => "object",
    }
  }

  pub fn matches(&self, value: &Value) -> bool {
    match self {
      SchemaType::String => value.is_string(),
      SchemaType::Number => value.is_number(),
      SchemaType::Integer => value.is_i64() || value.is_u64(),
      SchemaType::Boolean => value.is_boolean(),
      SchemaType::Null => value.is_null(),
      SchemaType::Array => value.is_array(),
      SchemaType::Object => value.is_object(),
    }
  }
}

/// A parsed object schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
  pub properties: BTreeMap<String, SchemaType>,
  pub required: Vec<String>,
}

impl InputSchema {
  /// Parse an object schema, rejecting shapes that cannot be checked.
  pub fn from_json(schema: &Value) -> Result<Self, String> {
    let Some(obj) = schema.as_object() else {
      return Err("inputSchema must be an object".to_string());
    };

    if let Some(ty) = obj.get("type") {
      if ty.as_str() != Some("object") {
        return Err("inputSchema type must be \"object\"".to_string());
      }
    }

    let mut properties = BTreeMap::new();
    if let Some(props) = obj.get("properties") {
      let Some(props) = props.as_object() else {
        return Err("inputSchema.properties must be an object".to_string());
      };
      for (name, prop) in props {
        let type_str = prop.get("type").and_then(Value::as_str).ok_or_else(|| {
          format!("inputSchema.properties.{} must declare a type", name)
        })?;
        let schema_type = SchemaType::parse(type_str)
          .ok_or_else(|| format!("inputSchema.properties.{}: unknown type '{}'", name, type_str))?;
        properties.insert(name.clone(), schema_type);
      }
    }

    let required = match obj.get("required") {
      None => Vec::new(),
      Some(Value::Array(items)) => items
        .iter()
        .map(|item| {
          item
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "inputSchema.required must list field names".to_string())
        })
        .collect::<Result<Vec<_>, _>>()?,
      Some(_) => return Err("inputSchema.required must be an array".to_string()),
    };

    Ok(Self {
      properties,
      required,
    })
  }

  /// Check a payload, returning every violation found.
  pub fn check(&self, input: &Value) -> Result<(), Vec<String>> {
    let Some(obj) = input.as_object() else {
      return Err(vec!["input must be an object".to_string()]);
    };

    let mut violations = Vec::new();
    for field in &self.required {
      if !obj.contains_key(field) {
        violations.push(format!("missing required field '{}'", field));
      }
    }
    for (field, schema_type) in &self.properties {
      if let Some(value) = obj.get(field) {
        if !schema_type.matches(value) {
          violations.push(format!(
            "field '{}' expected {}, got {}",
            field,
            schema_type.as_str(),
            type_name(value)
          ));
        }
      }
    }

    if violations.is_empty() {
      Ok(())
    } else {
      Err(violations)
    }
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Read a number from a resolved config value.
///
/// Templates resolve to strings when mixed with text, so numeric strings
/// are accepted.
pub fn coerce_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn schema() -> InputSchema {
    InputSchema::from_json(&json!({
      "type": "object",
      "properties": {
        "id": { "type": "integer" },
        "email": { "type": "string" }
      },
      "required": ["id"]
    }))
    .unwrap()
  }

  #[test]
  fn test_valid_input() {
    assert!(schema().check(&json!({ "id": 42, "extra": true })).is_ok());
  }

  #[test]
  fn test_violations_are_collected() {
    let errors = schema().check(&json!({ "email": 5 })).unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("'id'"));
    assert!(errors[1].contains("expected string, got number"));
  }

  #[test]
  fn test_non_object_input() {
    assert!(schema().check(&json!([1, 2])).is_err());
  }

  #[test]
  fn test_rejects_malformed_schema() {
    assert!(InputSchema::from_json(&json!("string")).is_err());
    assert!(InputSchema::from_json(&json!({ "properties": { "a": {} } })).is_err());
    assert!(InputSchema::from_json(&json!({ "properties": { "a": { "type": "date" } } })).is_err());
    assert!(InputSchema::from_json(&json!({ "required": "id" })).is_err());
  }

  #[test]
  fn test_coerce_number() {
    assert_eq!(coerce_number(&json!(12.5)), Some(12.5));
    assert_eq!(coerce_number(&json!(" 3 ")), Some(3.0));
    assert_eq!(coerce_number(&json!("abc")), None);
    assert_eq!(coerce_number(&json!("NaN")), None);
    assert_eq!(coerce_number(&json!(null)), None);
  }
}
