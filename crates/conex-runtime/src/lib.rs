//! Conex Runtime
//!
//! Executes locked flows. The [`FlowExecutor`] validates a [`FlowDef`],
//! resolves `{{ ... }}` templates in each node's config against the run's
//! context, and dispatches every node to the runner registered for its kind:
//!
//! - `trigger` seeds `trigger.input` with the payload
//! - `httpCall` calls an external endpoint, optionally through a connection
//! - `documentGeneration` creates a document from a template
//! - `dataTransform` reshapes values already in the context
//! - `monitor` captures upstream outputs for inspection
//!
//! The result of a run is an [`ExecutionRecord`] holding one [`StepResult`]
//! per node.
//!
//! [`FlowDef`]: conex_config::FlowDef

mod config;
mod context;
mod error;
mod events;
mod executor;
mod record;
mod registry;
mod runner;
mod runners;
mod schema;

pub use config::{ExecutorConfig, RetryPolicy};
pub use context::ExecutionContext;
pub use error::{ConfigError, ExecutionError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::FlowExecutor;
pub use record::{ExecutionRecord, RunStatus, StepResult, StepStatus};
pub use registry::RunnerRegistry;
pub use runner::{ErrorKind, NodeRunner, RunContext, RunnerError};
pub use runners::{
  DataTransformRunner, DocumentGenerationRunner, HttpCallRunner, MonitorRunner, TriggerRunner,
};
pub use schema::{InputSchema, SchemaType, coerce_number};
