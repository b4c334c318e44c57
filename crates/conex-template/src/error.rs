//! Template error types.

/// Errors raised while parsing or resolving templates and paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
  /// Malformed placeholder delimiters.
  #[error("invalid template at offset {position}: {message}")]
  Syntax { position: usize, message: String },

  /// Malformed variable path inside a placeholder or mapping.
  #[error("invalid path '{path}' at offset {position}: {message}")]
  InvalidPath {
    path: String,
    position: usize,
    message: String,
  },

  /// First path segment is not a known namespace.
  #[error(
    "unknown root '{root}' in '{path}' at offset {position} (expected trigger, step_<id> or connections.<id>)"
  )]
  UnknownRoot {
    root: String,
    path: String,
    position: usize,
  },

  /// The root namespace exists in the grammar but not in the scope, e.g. a
  /// step that has not run yet.
  #[error("unresolved reference '{reference}'")]
  UnresolvedReference { reference: String },

  /// The path is valid but no value exists at it.
  #[error("no value at '{reference}'")]
  MissingField { reference: String },

  /// A `[]` wildcard was applied to something that is not an array.
  #[error("'{reference}' expands a wildcard over a non-array value")]
  NotAnArray { reference: String },

  /// Error raised while resolving a specific config field.
  #[error("field '{field}': {source}")]
  InField {
    field: String,
    #[source]
    source: Box<TemplateError>,
  },
}

impl TemplateError {
  /// Attach the config field being resolved.
  pub fn in_field(self, field: impl Into<String>) -> Self {
    let field = field.into();
    if field.is_empty() {
      return self;
    }
    TemplateError::InField {
      field,
      source: Box::new(self),
    }
  }

  /// The innermost error, skipping field context.
  pub fn root_cause(&self) -> &TemplateError {
    match self {
      TemplateError::InField { source, .. } => source.root_cause(),
      other => other,
    }
  }
}
