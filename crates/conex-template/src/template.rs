use crate::error::TemplateError;
use crate::path::VarPath;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A `{{ path }}` occurrence inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
  pub path: VarPath,
  /// Byte offset of the opening `{{` in the source string.
  pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
  Literal(String),
  Placeholder(Placeholder),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
  source: String,
  parts: Vec<Part>,
}

impl Template {
  pub fn parse(source: &str) -> Result<Self, TemplateError> {
    let mut parts = Vec::new();
    let mut rest = source;
    let mut cursor = 0;

    while let Some(start) = rest.find(OPEN) {
      if start > 0 {
        parts.push(Part::Literal(rest[..start].to_string()));
      }

      let offset = cursor + start;
      let after_open = &rest[start + OPEN.len()..];
      let Some(end) = after_open.find(CLOSE) else {
        return Err(TemplateError::Syntax {
          position: offset,
          message: "unclosed '{{'".to_string(),
        });
      };

      let inner = &after_open[..end];
      let trimmed = inner.trim();
      if trimmed.is_empty() {
        return Err(TemplateError::Syntax {
          position: offset,
          message: "empty placeholder".to_string(),
        });
      }

      let leading = inner.len() - inner.trim_start().len();
      let path_offset = offset + OPEN.len() + leading;
      let path = VarPath::parse_at(trimmed, path_offset)?;
      parts.push(Part::Placeholder(Placeholder { path, offset }));

      let consumed = start + OPEN.len() + end + CLOSE.len();
      rest = &rest[consumed..];
      cursor += consumed;
    }

    if !rest.is_empty() {
      parts.push(Part::Literal(rest.to_string()));
    }

    Ok(Self {
      source: source.to_string(),
      parts,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn parts(&self) -> &[Part] {
    &self.parts
  }

  /// True when the template contains no placeholders.
  pub fn is_literal(&self) -> bool {
    self.placeholders().next().is_none()
  }

  /// The placeholder when the whole template is exactly one placeholder.
  ///
  /// Such templates resolve to the referenced value with its JSON type kept.
  pub fn single_placeholder(&self) -> Option<&Placeholder> {
    match self.parts.as_slice() {
      [Part::Placeholder(p)] => Some(p),
      _ => None,
    }
  }

  pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
    self.parts.iter().filter_map(|part| match part {
      Part::Placeholder(p) => Some(p),
      Part::Literal(_) => None,
    })
  }

  /// Every variable path referenced by the template.
  pub fn references(&self) -> impl Iterator<Item = &VarPath> {
    self.placeholders().map(|p| &p.path)
  }
}
