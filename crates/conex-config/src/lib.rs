//! Conex Config
//!
//! This crate contains the serializable flow definition types for Conex.
//! These types represent flows exactly as the graph editor persists them,
//! before they are validated and locked by `conex-flow`.
//!
//! Definitions can be loaded from:
//! - JSON files (via the CLI with `conex run flow.json`)
//! - Document storage (as JSON blobs handed over by the CRM)
//!
//! Node configuration is kept as raw JSON here. Each runner validates its own
//! config shape before templates are resolved.

mod connection;
mod edge;
mod flow;
mod node;

pub use connection::{AuthType, ConnectionDef, Credentials};
pub use edge::EdgeDef;
pub use flow::FlowDef;
pub use node::{NodeDef, NodeKind, RawConfig};
