//! Conex Flow
//!
//! This crate provides the "locked" flow representation for Conex.
//! A locked flow is a validated, immutable snapshot of a flow definition
//! that is ready for execution.
//!
//! Key differences from `conex-config`:
//! - Graph structure is validated (known endpoints, no cycles, no orphans)
//! - Exactly one trigger node is present and it has no predecessors
//! - Node ids are addressable by the template path grammar
//! - A topological order, entry point and join points are precomputed

mod error;
mod flow;
mod graph;

pub use error::FlowError;
pub use flow::{Flow, Node};
pub use graph::Graph;
