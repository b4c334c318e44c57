//! Template resolution for flow node configuration.
//!
//! Node config string leaves may embed placeholders that reference the
//! execution context:
//!
//! ```text
//! https://api.example.com/leads/{{ trigger.input.id }}
//! {{ step_fetch.response.items[0].name }}
//! {{ step_fetch.response.items[].email }}
//! {{ connections.crm.apiKey }}
//! ```
//!
//! Templates are parsed into an AST of literal and placeholder parts, so
//! errors carry the byte offset of the offending placeholder and the same
//! path grammar serves both templates and data-transform mappings.
//!
//! # Roots
//! The first path segment selects a namespace, checked in this order:
//! 1. `trigger` - the trigger object (`trigger.input` is the seed payload)
//! 2. `step_<nodeId>` - output of a completed node
//! 3. `connections.<connectionId>` - resolved connection fields
//!
//! Anything else is rejected at parse time.
//!
//! # Strictness
//! A placeholder whose path does not exist renders as an empty string in
//! [`Strictness::Text`] fields and fails in [`Strictness::Structural`] fields.
//! Which fields are structural is declared by each node through a
//! [`FieldPolicy`]. A root that is not present in the scope always fails.

mod error;
mod path;
mod resolve;
mod template;

pub use error::TemplateError;
pub use path::{FieldPath, Root, Segment, VarPath};
pub use resolve::{
  FieldPolicy, Scope, Strictness, collect_references, lookup, resolve_str, resolve_value, stringify,
};
pub use template::{Part, Placeholder, Template};
