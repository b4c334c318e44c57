use serde_json::{Map, Value};

use crate::error::TemplateError;
use crate::path::{Root, VarPath};
use crate::template::{Part, Template};

/// Read access to the namespaces a template can reference.
pub trait Scope {
  /// The trigger object; the seed payload lives under `input`.
  fn trigger(&self) -> Option<&Value>;

  /// Output of a node that has completed.
  fn step(&self, node_id: &str) -> Option<&Value>;

  /// Template view of a resolved connection.
  fn connection(&self, connection_id: &str) -> Option<&Value>;
}

/// How a missing terminal field is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
  /// Free text: a missing field renders as an empty string.
  Text,
  /// Structural value: a missing field is an error.
  Structural,
}

/// Per-node declaration of how config fields are resolved.
///
/// Patterns use the field display form: object keys joined by `.`, array
/// elements as `[]` (e.g. `lineItems[].price`). A pattern also covers every
/// field nested below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPolicy {
  structural: &'static [&'static str],
  verbatim: &'static [&'static str],
}

impl FieldPolicy {
  /// Every field is free text.
  pub const TEXT: FieldPolicy = FieldPolicy {
    structural: &[],
    verbatim: &[],
  };

  pub const fn new(structural: &'static [&'static str]) -> Self {
    Self {
      structural,
      verbatim: &[],
    }
  }

  /// Fields left untouched by template resolution.
  pub const fn with_verbatim(self, verbatim: &'static [&'static str]) -> Self {
    Self {
      structural: self.structural,
      verbatim,
    }
  }

  pub fn strictness(&self, field: &str) -> Strictness {
    if matches_any(self.structural, field) {
      Strictness::Structural
    } else {
      Strictness::Text
    }
  }

  pub fn is_verbatim(&self, field: &str) -> bool {
    matches_any(self.verbatim, field)
  }
}

fn matches_any(patterns: &[&str], field: &str) -> bool {
  if patterns.is_empty() {
    return false;
  }
  let normalized = normalize_field(field);
  patterns.iter().any(|pattern| {
    normalized == *pattern
      || normalized
        .strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
  })
}

/// `lineItems[3].price` -> `lineItems[].price`
fn normalize_field(field: &str) -> String {
  let mut out = String::with_capacity(field.len());
  let mut in_index = false;
  for c in field.chars() {
    match c {
      '[' => {
        in_index = true;
        out.push(c);
      }
      ']' => {
        in_index = false;
        out.push(c);
      }
      c if in_index && c.is_ascii_digit() => {}
      c => out.push(c),
    }
  }
  out
}

fn child_field(parent: &str, key: &str) -> String {
  if parent.is_empty() {
    key.to_string()
  } else {
    format!("{}.{}", parent, key)
  }
}

/// Look up a rooted path in a scope.
///
/// `Ok(None)` means the root exists but the field does not. A root missing
/// from the scope is an [`TemplateError::UnresolvedReference`].
pub fn lookup<S: Scope + ?Sized>(path: &VarPath, scope: &S) -> Result<Option<Value>, TemplateError> {
  let root_value = match path.root() {
    Root::Trigger => scope.trigger(),
    Root::Step(node_id) => scope.step(node_id),
    Root::Connection(connection_id) => scope.connection(connection_id),
  };

  let Some(root_value) = root_value else {
    return Err(TemplateError::UnresolvedReference {
      reference: path.as_str().to_string(),
    });
  };

  path.select_from(root_value)
}

/// Render a value for interpolation into text.
pub fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn resolve_template<S: Scope + ?Sized>(
  template: &Template,
  scope: &S,
  strictness: Strictness,
) -> Result<Value, TemplateError> {
  let lookup_part = |path: &VarPath| -> Result<Option<Value>, TemplateError> {
    match lookup(path, scope)? {
      Some(value) => Ok(Some(value)),
      None if strictness == Strictness::Structural => Err(TemplateError::MissingField {
        reference: path.as_str().to_string(),
      }),
      None => Ok(None),
    }
  };

  if let Some(placeholder) = template.single_placeholder() {
    return Ok(lookup_part(&placeholder.path)?.unwrap_or_else(|| Value::String(String::new())));
  }

  let mut out = String::with_capacity(template.source().len());
  for part in template.parts() {
    match part {
      Part::Literal(text) => out.push_str(text),
      Part::Placeholder(placeholder) => {
        if let Some(value) = lookup_part(&placeholder.path)? {
          out.push_str(&stringify(&value));
        }
      }
    }
  }
  Ok(Value::String(out))
}

/// Resolve a single template string.
///
/// A string that is exactly one placeholder yields the referenced value with
/// its JSON type. Anything else yields a string.
pub fn resolve_str<S: Scope + ?Sized>(
  source: &str,
  scope: &S,
  strictness: Strictness,
) -> Result<Value, TemplateError> {
  let template = Template::parse(source)?;
  resolve_template(&template, scope, strictness)
}

/// Resolve every string leaf of a config value.
///
/// Non-string leaves pass through. Errors name the config field they came
/// from.
pub fn resolve_value<S: Scope + ?Sized>(
  value: &Value,
  scope: &S,
  policy: &FieldPolicy,
) -> Result<Value, TemplateError> {
  resolve_at(value, "", scope, policy)
}

fn resolve_at<S: Scope + ?Sized>(
  value: &Value,
  field: &str,
  scope: &S,
  policy: &FieldPolicy,
) -> Result<Value, TemplateError> {
  if !field.is_empty() && policy.is_verbatim(field) {
    return Ok(value.clone());
  }

  match value {
    Value::String(source) => {
      resolve_str(source, scope, policy.strictness(field)).map_err(|e| e.in_field(field))
    }
    Value::Array(items) => items
      .iter()
      .enumerate()
      .map(|(i, item)| resolve_at(item, &format!("{}[{}]", field, i), scope, policy))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => {
      let mut resolved = Map::with_capacity(map.len());
      for (key, item) in map {
        resolved.insert(
          key.clone(),
          resolve_at(item, &child_field(field, key), scope, policy)?,
        );
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

/// Parse every template in a config value and return the referenced paths
/// with the field they appear in.
///
/// Used to reject malformed templates and unknown roots before a run starts.
pub fn collect_references(
  value: &Value,
  policy: &FieldPolicy,
) -> Result<Vec<(String, VarPath)>, TemplateError> {
  let mut refs = Vec::new();
  collect_at(value, "", policy, &mut refs)?;
  Ok(refs)
}

fn collect_at(
  value: &Value,
  field: &str,
  policy: &FieldPolicy,
  refs: &mut Vec<(String, VarPath)>,
) -> Result<(), TemplateError> {
  if !field.is_empty() && policy.is_verbatim(field) {
    return Ok(());
  }

  match value {
    Value::String(source) => {
      let template = Template::parse(source).map_err(|e| e.in_field(field))?;
      refs.extend(template.references().map(|path| (field.to_string(), path.clone())));
    }
    Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        collect_at(item, &format!("{}[{}]", field, i), policy, refs)?;
      }
    }
    Value::Object(map) => {
      for (key, item) in map {
        collect_at(item, &child_field(field, key), policy, refs)?;
      }
    }
    _ => {}
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashMap;

  #[derive(Default)]
  struct TestScope {
    trigger: Option<Value>,
    steps: HashMap<String, Value>,
    connections: HashMap<String, Value>,
  }

  impl Scope for TestScope {
    fn trigger(&self) -> Option<&Value> {
      self.trigger.as_ref()
    }

    fn step(&self, node_id: &str) -> Option<&Value> {
      self.steps.get(node_id)
    }

    fn connection(&self, connection_id: &str) -> Option<&Value> {
      self.connections.get(connection_id)
    }
  }

  fn scope() -> TestScope {
    let mut scope = TestScope {
      trigger: Some(json!({ "input": { "id": 42, "name": "Ada", "note": null } })),
      ..Default::default()
    };
    scope.steps.insert(
      "fetch".to_string(),
      json!({ "status": 200, "response": { "items": [{ "name": "a" }, { "name": "b" }] } }),
    );
    scope.connections.insert(
      "crm".to_string(),
      json!({ "apiKey": "k-123", "headers": { "Authorization": "Bearer t" } }),
    );
    scope
  }

  #[test]
  fn test_single_placeholder_keeps_type() {
    let scope = scope();
    assert_eq!(
      resolve_str("{{ trigger.input.id }}", &scope, Strictness::Structural).unwrap(),
      json!(42)
    );
    assert_eq!(
      resolve_str("{{step_fetch.response.items[].name}}", &scope, Strictness::Text).unwrap(),
      json!(["a", "b"])
    );
  }

  #[test]
  fn test_mixed_text_stringifies() {
    let scope = scope();
    let out = resolve_str(
      "https://api.example.com/leads/{{trigger.input.id}}?n={{trigger.input.note}}",
      &scope,
      Strictness::Structural,
    )
    .unwrap();
    assert_eq!(out, json!("https://api.example.com/leads/42?n="));

    let out = resolve_str(
      "first={{ step_fetch.response.items[0].name }} all={{ step_fetch.response.items[].name }}",
      &scope,
      Strictness::Text,
    )
    .unwrap();
    assert_eq!(out, json!("first=a all=[\"a\",\"b\"]"));
  }

  #[test]
  fn test_missing_field_by_strictness() {
    let scope = scope();
    assert_eq!(
      resolve_str("Dear {{trigger.input.surname}}", &scope, Strictness::Text).unwrap(),
      json!("Dear ")
    );
    assert_eq!(
      resolve_str("{{trigger.input.surname}}", &scope, Strictness::Text).unwrap(),
      json!("")
    );
    assert_eq!(
      resolve_str("{{trigger.input.surname}}", &scope, Strictness::Structural).unwrap_err(),
      TemplateError::MissingField {
        reference: "trigger.input.surname".to_string()
      }
    );
  }

  #[test]
  fn test_unexecuted_step_is_unresolved() {
    let scope = scope();
    for strictness in [Strictness::Text, Strictness::Structural] {
      let err = resolve_str("{{ step_later.id }}", &scope, strictness).unwrap_err();
      assert_eq!(
        err,
        TemplateError::UnresolvedReference {
          reference: "step_later.id".to_string()
        }
      );
    }
  }

  #[test]
  fn test_resolve_value_with_policy() {
    const POLICY: FieldPolicy = FieldPolicy::new(&["url", "lineItems[].price"]);
    let scope = scope();

    let config = json!({
      "url": "https://x/{{trigger.input.id}}",
      "title": "Hi {{trigger.input.missing}}",
      "retries": 2,
      "headers": { "Authorization": "{{connections.crm.headers.Authorization}}" },
      "lineItems": [{ "price": "{{trigger.input.id}}" }],
    });
    let resolved = resolve_value(&config, &scope, &POLICY).unwrap();
    assert_eq!(resolved["url"], json!("https://x/42"));
    assert_eq!(resolved["title"], json!("Hi "));
    assert_eq!(resolved["retries"], json!(2));
    assert_eq!(resolved["headers"]["Authorization"], json!("Bearer t"));
    assert_eq!(resolved["lineItems"][0]["price"], json!(42));

    let broken = json!({ "lineItems": [{ "price": "{{trigger.input.missing}}" }] });
    let err = resolve_value(&broken, &scope, &POLICY).unwrap_err();
    match &err {
      TemplateError::InField { field, .. } => assert_eq!(field, "lineItems[0].price"),
      other => panic!("expected field context, got {:?}", other),
    }
    assert!(matches!(err.root_cause(), TemplateError::MissingField { .. }));
  }

  #[test]
  fn test_verbatim_fields_are_untouched() {
    const POLICY: FieldPolicy = FieldPolicy::TEXT.with_verbatim(&["transformations"]);
    let scope = scope();
    let config = json!({ "transformations": [{ "source": "{{ step_missing }}" }] });
    assert_eq!(resolve_value(&config, &scope, &POLICY).unwrap(), config);
    assert!(collect_references(&config, &POLICY).unwrap().is_empty());
  }

  #[test]
  fn test_collect_references() {
    let config = json!({
      "url": "https://x/{{trigger.input.id}}",
      "body": { "name": "{{ step_fetch.response.name }}" },
    });
    let refs = collect_references(&config, &FieldPolicy::TEXT).unwrap();
    let mut fields: Vec<&str> = refs.iter().map(|(f, _)| f.as_str()).collect();
    fields.sort();
    assert_eq!(fields, vec!["body.name", "url"]);

    let bad = json!({ "url": "{{ lead.id }}" });
    let err = collect_references(&bad, &FieldPolicy::TEXT).unwrap_err();
    assert!(matches!(err.root_cause(), TemplateError::UnknownRoot { .. }));
  }

  #[test]
  fn test_policy_prefix_match() {
    let policy = FieldPolicy::new(&["recipient"]);
    assert_eq!(policy.strictness("recipient.email"), Strictness::Structural);
    assert_eq!(policy.strictness("recipientNote"), Strictness::Text);
  }
}
