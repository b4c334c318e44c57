//! Variable path grammar.
//!
//! ```text
//! path    = segment ( "." segment )*
//! segment = key ( "[" index? "]" )*
//! key     = any chars except . [ ] { } and whitespace
//! index   = digits              ; "[]" is a wildcard
//! ```
//!
//! A relative [`FieldPath`] may also start with a bracket, e.g. `[0].name`.

use std::fmt;

use serde_json::Value;

use crate::error::TemplateError;

const STEP_PREFIX: &str = "step_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Object field access.
  Key(String),
  /// Array element access, `[n]`.
  Index(usize),
  /// Projection across every array element, `[]`.
  Wildcard,
}

/// A path relative to some JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
  raw: String,
  segments: Vec<Segment>,
}

impl FieldPath {
  /// Parse a relative path such as `items[].name` or `items[0].name`.
  pub fn parse(raw: &str) -> Result<Self, TemplateError> {
    let raw = raw.trim();
    let segments = parse_segments(raw, 0, true)?;
    Ok(Self {
      raw: raw.to_string(),
      segments,
    })
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn has_wildcard(&self) -> bool {
    self.segments.contains(&Segment::Wildcard)
  }

  /// Select the value at this path.
  ///
  /// Returns `Ok(None)` when the path does not exist. A wildcard over a
  /// non-array value is an error.
  pub fn select(&self, value: &Value) -> Result<Option<Value>, TemplateError> {
    select_segments(value, &self.segments, &self.raw)
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// The namespace a [`VarPath`] starts from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Root {
  Trigger,
  Step(String),
  Connection(String),
}

/// A rooted path into the execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath {
  raw: String,
  root: Root,
  segments: Vec<Segment>,
}

impl VarPath {
  /// Parse a rooted path such as `trigger.input.id` or `step_fetch.response`.
  pub fn parse(raw: &str) -> Result<Self, TemplateError> {
    Self::parse_at(raw.trim(), 0)
  }

  /// Parse a rooted path reporting errors relative to `position`.
  pub(crate) fn parse_at(raw: &str, position: usize) -> Result<Self, TemplateError> {
    let mut segments = parse_segments(raw, position, false)?;

    let first = match segments.first() {
      Some(Segment::Key(key)) => key.clone(),
      _ => {
        return Err(TemplateError::InvalidPath {
          path: raw.to_string(),
          position,
          message: "path must start with a namespace".to_string(),
        });
      }
    };

    let (root, consumed) = if first == "trigger" {
      (Root::Trigger, 1)
    } else if let Some(node_id) = first.strip_prefix(STEP_PREFIX).filter(|id| !id.is_empty()) {
      (Root::Step(node_id.to_string()), 1)
    } else if first == "connections" {
      match segments.get(1) {
        Some(Segment::Key(id)) => (Root::Connection(id.clone()), 2),
        _ => {
          return Err(TemplateError::InvalidPath {
            path: raw.to_string(),
            position,
            message: "expected a connection id after 'connections'".to_string(),
          });
        }
      }
    } else {
      return Err(TemplateError::UnknownRoot {
        root: first,
        path: raw.to_string(),
        position,
      });
    };

    segments.drain(..consumed);

    Ok(Self {
      raw: raw.to_string(),
      root,
      segments,
    })
  }

  pub fn root(&self) -> &Root {
    &self.root
  }

  /// Segments after the root.
  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Select the value at this path below an already resolved root value.
  pub fn select_from(&self, root_value: &Value) -> Result<Option<Value>, TemplateError> {
    select_segments(root_value, &self.segments, &self.raw)
  }
}

impl fmt::Display for VarPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

fn invalid(path: &str, position: usize, message: impl Into<String>) -> TemplateError {
  TemplateError::InvalidPath {
    path: path.to_string(),
    position,
    message: message.into(),
  }
}

fn parse_segments(
  raw: &str,
  position: usize,
  allow_leading_bracket: bool,
) -> Result<Vec<Segment>, TemplateError> {
  if raw.is_empty() {
    return Err(invalid(raw, position, "empty path"));
  }

  let mut segments = Vec::new();
  let mut chars = raw.char_indices().peekable();

  loop {
    let mut key = String::new();
    while let Some(&(offset, c)) = chars.peek() {
      match c {
        '.' | '[' => break,
        ']' | '{' | '}' => {
          return Err(invalid(raw, position + offset, format!("unexpected {:?}", c)));
        }
        c if c.is_whitespace() => {
          return Err(invalid(raw, position + offset, "unexpected whitespace"));
        }
        c => {
          key.push(c);
          chars.next();
        }
      }
    }

    let at_start = segments.is_empty();
    let opens_bracket = matches!(chars.peek(), Some((_, '[')));
    if key.is_empty() && !(at_start && allow_leading_bracket && opens_bracket) {
      let offset = chars.peek().map(|(o, _)| *o).unwrap_or(raw.len());
      return Err(invalid(raw, position + offset, "empty segment"));
    }
    if !key.is_empty() {
      segments.push(Segment::Key(key));
    }

    while let Some(&(open, '[')) = chars.peek() {
      chars.next();
      let mut index = String::new();
      let mut closed = false;
      for (_, c) in chars.by_ref() {
        if c == ']' {
          closed = true;
          break;
        }
        index.push(c);
      }
      if !closed {
        return Err(invalid(raw, position + open, "unclosed '['"));
      }
      if index.is_empty() {
        segments.push(Segment::Wildcard);
      } else {
        let n = index
          .parse::<usize>()
          .map_err(|_| invalid(raw, position + open, format!("invalid index '{}'", index)))?;
        segments.push(Segment::Index(n));
      }
    }

    match chars.next() {
      None => break,
      Some((_, '.')) => {
        if chars.peek().is_none() {
          return Err(invalid(raw, position + raw.len(), "trailing '.'"));
        }
      }
      Some((offset, c)) => {
        return Err(invalid(raw, position + offset, format!("unexpected {:?}", c)));
      }
    }
  }

  Ok(segments)
}

fn select_segments(
  value: &Value,
  segments: &[Segment],
  reference: &str,
) -> Result<Option<Value>, TemplateError> {
  let Some((first, rest)) = segments.split_first() else {
    return Ok(Some(value.clone()));
  };

  match first {
    Segment::Key(key) => match value.get(key.as_str()) {
      Some(next) if value.is_object() => select_segments(next, rest, reference),
      _ => Ok(None),
    },
    Segment::Index(index) => match value.as_array().and_then(|items| items.get(*index)) {
      Some(next) => select_segments(next, rest, reference),
      None => Ok(None),
    },
    Segment::Wildcard => {
      let Some(items) = value.as_array() else {
        return Err(TemplateError::NotAnArray {
          reference: reference.to_string(),
        });
      };
      let mut projected = Vec::with_capacity(items.len());
      for item in items {
        match select_segments(item, rest, reference)? {
          Some(v) => projected.push(v),
          None => return Ok(None),
        }
      }
      Ok(Some(Value::Array(projected)))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_segments() {
    let path = FieldPath::parse("items[0].tags[].name").unwrap();
    assert_eq!(
      path.segments(),
      &[
        Segment::Key("items".to_string()),
        Segment::Index(0),
        Segment::Key("tags".to_string()),
        Segment::Wildcard,
        Segment::Key("name".to_string()),
      ]
    );
    assert!(path.has_wildcard());
  }

  #[test]
  fn test_leading_bracket_only_for_field_paths() {
    assert!(FieldPath::parse("[0].name").is_ok());
    assert!(VarPath::parse("[0].name").is_err());
  }

  #[test]
  fn test_roots() {
    assert_eq!(
      VarPath::parse("trigger.input.id").unwrap().root(),
      &Root::Trigger
    );

    let step = VarPath::parse("step_api-call-1.response.name").unwrap();
    assert_eq!(step.root(), &Root::Step("api-call-1".to_string()));
    assert_eq!(step.segments().len(), 2);

    let conn = VarPath::parse("connections.crm.headers.Authorization").unwrap();
    assert_eq!(conn.root(), &Root::Connection("crm".to_string()));
    assert_eq!(conn.segments().len(), 2);
  }

  #[test]
  fn test_unknown_root() {
    match VarPath::parse("lead.name") {
      Err(TemplateError::UnknownRoot { root, .. }) => assert_eq!(root, "lead"),
      other => panic!("expected unknown root, got {:?}", other),
    }
    assert!(matches!(
      VarPath::parse("step_.x"),
      Err(TemplateError::UnknownRoot { .. })
    ));
    assert!(matches!(
      VarPath::parse("connections"),
      Err(TemplateError::InvalidPath { .. })
    ));
  }

  #[test]
  fn test_malformed_paths() {
    for bad in ["a..b", "a.", "a[x]", "a[0", "a]b", "a b", ""] {
      assert!(FieldPath::parse(bad).is_err(), "expected error for {:?}", bad);
    }
  }

  #[test]
  fn test_select_wildcard_and_index() {
    let data = json!({ "items": [{ "name": "a" }, { "name": "b" }] });

    let names = FieldPath::parse("items[].name").unwrap().select(&data).unwrap();
    assert_eq!(names, Some(json!(["a", "b"])));

    let first = FieldPath::parse("items[0].name").unwrap().select(&data).unwrap();
    assert_eq!(first, Some(json!("a")));

    let out_of_bounds = FieldPath::parse("items[5].name").unwrap().select(&data).unwrap();
    assert_eq!(out_of_bounds, None);
  }

  #[test]
  fn test_wildcard_over_scalar_is_error() {
    let data = json!({ "items": "not a list" });
    let err = FieldPath::parse("items[].name").unwrap().select(&data).unwrap_err();
    assert!(matches!(err, TemplateError::NotAnArray { .. }));
  }

  #[test]
  fn test_missing_key_in_projection() {
    let data = json!({ "items": [{ "name": "a" }, { "other": 1 }] });
    let result = FieldPath::parse("items[].name").unwrap().select(&data).unwrap();
    assert_eq!(result, None);
  }
}
