//! Flow executor.
//!
//! The [`FlowExecutor`] validates a flow definition, then walks its graph
//! running every node whose predecessors all succeeded. Independent nodes run
//! concurrently. A failed node causes its descendants to be skipped but does
//! not stop independent branches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conex_config::{FlowDef, NodeKind, RawConfig};
use conex_connection::{ConnectionProvider, ConnectionResolver};
use conex_flow::Flow;
use conex_host_http::HttpTransport;
use conex_template::{FieldPolicy, Root, collect_references, resolve_value};
use futures::future::{BoxFuture, try_join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::{ConfigError, ExecutionError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::record::{ExecutionRecord, RunStatus, StepResult, StepStatus};
use crate::registry::RunnerRegistry;
use crate::runner::{ErrorKind, NodeRunner, RunContext, RunnerError};

type NodeOutcome = (String, Result<Result<Value, RunnerError>, JoinError>);

/// What the executor needs to run one node, computed before the run starts.
struct NodePlan {
  runner: Arc<dyn NodeRunner>,
  policy: FieldPolicy,
  connection_ids: Vec<String>,
}

/// A validated flow with a plan for every node.
struct PreparedFlow {
  flow: Flow,
  plans: HashMap<String, NodePlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
  Pending,
  Running,
  Done,
}

/// Executes flows.
///
/// One executor can run many flows concurrently; runs share no mutable
/// state. Connections are resolved through the provider once per run.
pub struct FlowExecutor {
  config: Arc<ExecutorConfig>,
  transport: Arc<dyn HttpTransport>,
  connections: Arc<dyn ConnectionProvider>,
  registry: RunnerRegistry,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl FlowExecutor {
  pub fn new(
    config: ExecutorConfig,
    transport: Arc<dyn HttpTransport>,
    connections: Arc<dyn ConnectionProvider>,
  ) -> Self {
    Self {
      config: Arc::new(config),
      transport,
      connections,
      registry: RunnerRegistry::new(),
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// Set a notifier for execution events.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  /// Check a flow definition without running it.
  pub fn validate(&self, def: &FlowDef) -> Result<(), ConfigError> {
    self.prepare(def).map(|_| ())
  }

  fn prepare(&self, def: &FlowDef) -> Result<PreparedFlow, ConfigError> {
    let flow = Flow::from_def(def.clone())?;
    let mut plans = HashMap::with_capacity(flow.len());

    for node in flow.nodes() {
      let runner = self.registry.get(node.kind);
      runner
        .validate(&node.config)
        .map_err(|e| ConfigError::NodeConfig {
          node_id: node.id.clone(),
          message: e.message,
        })?;

      let policy = runner.field_policy();
      let template_error = |source| ConfigError::Template {
        node_id: node.id.clone(),
        source,
      };
      let mut references: Vec<_> = collect_references(&node.config, &policy)
        .map_err(template_error)?
        .into_iter()
        .map(|(_, path)| path)
        .collect();
      references.extend(runner.references(&node.config).map_err(template_error)?);

      let ancestors = flow.graph().ancestors(&node.id);
      let mut connection_ids = runner.connection_ids(&node.config);
      for path in &references {
        match path.root() {
          Root::Step(step_id) if !ancestors.contains(step_id) => {
            return Err(ConfigError::NotUpstream {
              node_id: node.id.clone(),
              step_id: step_id.clone(),
              reference: path.to_string(),
            });
          }
          Root::Connection(connection_id) if !connection_ids.contains(connection_id) => {
            connection_ids.push(connection_id.clone());
          }
          _ => {}
        }
      }

      plans.insert(
        node.id.clone(),
        NodePlan {
          runner,
          policy,
          connection_ids,
        },
      );
    }

    Ok(PreparedFlow { flow, plans })
  }

  /// Run a flow with the given seed payload.
  ///
  /// Configuration errors are returned before any node runs. Node failures
  /// are recorded in the returned record.
  #[instrument(
    name = "flow_execute",
    skip(self, def, seed, cancel),
    fields(flow_id = %def.id)
  )]
  pub async fn execute(
    &self,
    def: &FlowDef,
    seed: Value,
    cancel: CancellationToken,
  ) -> Result<ExecutionRecord, ExecutionError> {
    let prepared = self.prepare(def).map_err(|e| {
      error!(flow_id = %def.id, error = %e, "flow_rejected");
      e
    })?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();

    info!(
      execution_id = %execution_id,
      flow_id = %def.id,
      node_count = prepared.flow.len(),
      "flow_started"
    );
    self.notifier.notify(ExecutionEvent::FlowStarted {
      execution_id: execution_id.clone(),
      flow_id: def.id.clone(),
    });

    let mut run = Run {
      executor: self,
      prepared: &prepared,
      execution_id: execution_id.clone(),
      resolver: Arc::new(ConnectionResolver::new(
        self.connections.clone(),
        self.transport.clone(),
        self.config.http_timeout,
      )),
      context: ExecutionContext::new(seed),
      states: prepared
        .flow
        .order()
        .iter()
        .map(|id| (id.clone(), NodeState::Pending))
        .collect(),
      started: HashMap::new(),
      aborts: HashMap::new(),
      steps: Vec::new(),
    };
    run.drive(&cancel).await;

    let status = run_status(&prepared.flow, &run.steps);
    let finished_at = Utc::now();

    info!(
      execution_id = %execution_id,
      flow_id = %def.id,
      status = ?status,
      steps = run.steps.len(),
      duration_ms = (finished_at - started_at).num_milliseconds(),
      "flow_finished"
    );
    self.notifier.notify(ExecutionEvent::FlowFinished {
      execution_id: execution_id.clone(),
      status,
    });

    Ok(ExecutionRecord {
      execution_id,
      flow_id: def.id.clone(),
      status,
      steps: run.steps,
      started_at,
      finished_at,
    })
  }
}

/// State of one run.
struct Run<'a> {
  executor: &'a FlowExecutor,
  prepared: &'a PreparedFlow,
  execution_id: String,
  resolver: Arc<ConnectionResolver>,
  context: ExecutionContext,
  states: HashMap<String, NodeState>,
  started: HashMap<String, DateTime<Utc>>,
  aborts: HashMap<String, AbortHandle>,
  steps: Vec<StepResult>,
}

impl Run<'_> {
  async fn drive(&mut self, cancel: &CancellationToken) {
    let max_concurrency = self.executor.config.max_concurrency.max(1);
    let mut in_flight: FuturesUnordered<BoxFuture<'static, NodeOutcome>> = FuturesUnordered::new();

    loop {
      if !cancel.is_cancelled() {
        for node_id in self.ready_nodes(max_concurrency.saturating_sub(in_flight.len())) {
          in_flight.push(self.spawn(node_id));
        }
      }
      if in_flight.is_empty() {
        break;
      }

      tokio::select! {
        Some((node_id, joined)) = in_flight.next() => self.complete(node_id, joined),
        _ = cancel.cancelled() => {
          warn!(execution_id = %self.execution_id, running = in_flight.len(), "flow_cancelled");
          for handle in self.aborts.values() {
            handle.abort();
          }
          // Keep results of nodes that finished before the abort landed.
          while let Some((node_id, joined)) = in_flight.next().await {
            match joined {
              Err(err) if err.is_cancelled() => self.cancel_node(&node_id),
              joined => self.complete(node_id, joined),
            }
          }
          break;
        }
      }
    }

    if cancel.is_cancelled() {
      let pending: Vec<String> = self
        .prepared
        .flow
        .order()
        .iter()
        .filter(|id| self.states.get(*id) != Some(&NodeState::Done))
        .cloned()
        .collect();
      for node_id in pending {
        self.cancel_node(&node_id);
      }
    }
  }

  /// Pending nodes whose predecessors all succeeded, in topological order.
  fn ready_nodes(&self, limit: usize) -> Vec<String> {
    let graph = self.prepared.flow.graph();
    self
      .prepared
      .flow
      .order()
      .iter()
      .filter(|id| self.states.get(*id) == Some(&NodeState::Pending))
      .filter(|id| {
        graph
          .upstream(id)
          .iter()
          .all(|up| self.context.completed().any(|done| done == up.as_str()))
      })
      .take(limit)
      .cloned()
      .collect()
  }

  fn spawn(&mut self, node_id: String) -> BoxFuture<'static, NodeOutcome> {
    let node = self.prepared.flow.get_node(&node_id);
    let plan = self.prepared.plans.get(&node_id);
    let (Some(node), Some(plan)) = (node, plan) else {
      // prepare() plans every node of the flow
      let error = RunnerError::validation(format!("node '{}' has no plan", node_id));
      return futures::future::ready((node_id, Ok(Err(error)))).boxed();
    };

    info!(
      execution_id = %self.execution_id,
      node_id = %node_id,
      node_type = %node.kind,
      "node_started"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: self.execution_id.clone(),
      node_id: node_id.clone(),
    });

    let ancestors = self.prepared.flow.graph().ancestors(&node_id);
    let job = NodeJob {
      execution_id: self.execution_id.clone(),
      node_id: node_id.clone(),
      kind: node.kind,
      config: node.config.clone(),
      ancestors: self
        .prepared
        .flow
        .order()
        .iter()
        .filter(|id| ancestors.contains(id.as_str()))
        .cloned()
        .collect(),
      runner: plan.runner.clone(),
      policy: plan.policy,
      connection_ids: plan.connection_ids.clone(),
      context: Arc::new(self.context.clone()),
      resolver: self.resolver.clone(),
      transport: self.executor.transport.clone(),
      settings: self.executor.config.clone(),
    };

    let handle = tokio::spawn(job.run());
    self.states.insert(node_id.clone(), NodeState::Running);
    self.started.insert(node_id.clone(), Utc::now());
    self.aborts.insert(node_id.clone(), handle.abort_handle());
    handle.map(move |joined| (node_id, joined)).boxed()
  }

  fn complete(&mut self, node_id: String, joined: Result<Result<Value, RunnerError>, JoinError>) {
    self.aborts.remove(&node_id);
    let result = joined.unwrap_or_else(|err| {
      Err(RunnerError::new(
        ErrorKind::Validation,
        format!("node task ended abnormally: {}", err),
        false,
      ))
    });

    match result {
      Ok(output) => self.succeed(node_id, output),
      Err(error) => self.fail(node_id, error),
    }
  }

  fn succeed(&mut self, node_id: String, output: Value) {
    info!(
      execution_id = %self.execution_id,
      node_id = %node_id,
      "node_succeeded"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeSucceeded {
      execution_id: self.execution_id.clone(),
      node_id: node_id.clone(),
      output: output.clone(),
    });
    self.context.insert_step(node_id.clone(), output.clone());
    self.write(node_id, StepStatus::Succeeded, Some(output), None, None);
  }

  fn fail(&mut self, node_id: String, error: RunnerError) {
    warn!(
      execution_id = %self.execution_id,
      node_id = %node_id,
      kind = %error.kind,
      retryable = error.retryable,
      error = %error.message,
      "node_failed"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeFailed {
      execution_id: self.execution_id.clone(),
      node_id: node_id.clone(),
      error: error.clone(),
    });
    self.write(node_id.clone(), StepStatus::Failed, None, Some(error), None);

    let descendants = self.prepared.flow.graph().descendants(&node_id);
    let blocked: Vec<String> = self
      .prepared
      .flow
      .order()
      .iter()
      .filter(|id| descendants.contains(*id))
      .filter(|id| self.states.get(*id) == Some(&NodeState::Pending))
      .cloned()
      .collect();
    for id in blocked {
      info!(
        execution_id = %self.execution_id,
        node_id = %id,
        blocked_by = %node_id,
        "node_skipped"
      );
      self.executor.notifier.notify(ExecutionEvent::NodeSkipped {
        execution_id: self.execution_id.clone(),
        node_id: id.clone(),
        blocked_by: node_id.clone(),
      });
      self.write(id, StepStatus::Skipped, None, None, Some(node_id.clone()));
    }
  }

  fn cancel_node(&mut self, node_id: &str) {
    self.aborts.remove(node_id);
    info!(
      execution_id = %self.execution_id,
      node_id = %node_id,
      "node_cancelled"
    );
    self.executor.notifier.notify(ExecutionEvent::NodeCancelled {
      execution_id: self.execution_id.clone(),
      node_id: node_id.to_string(),
    });
    self.write(node_id.to_string(), StepStatus::Cancelled, None, None, None);
  }

  fn write(
    &mut self,
    node_id: String,
    status: StepStatus,
    output: Option<Value>,
    error: Option<RunnerError>,
    blocked_by: Option<String>,
  ) {
    let node_type = self
      .prepared
      .flow
      .get_node(&node_id)
      .map(|n| n.kind)
      .unwrap_or(NodeKind::Trigger);
    self.states.insert(node_id.clone(), NodeState::Done);
    self.steps.push(StepResult {
      started_at: self.started.get(&node_id).copied(),
      node_id,
      node_type,
      status,
      output,
      error,
      blocked_by,
      finished_at: Utc::now(),
    });
  }
}

/// Everything a spawned node task owns.
struct NodeJob {
  execution_id: String,
  node_id: String,
  kind: NodeKind,
  config: RawConfig,
  ancestors: Vec<String>,
  runner: Arc<dyn NodeRunner>,
  policy: FieldPolicy,
  connection_ids: Vec<String>,
  context: Arc<ExecutionContext>,
  resolver: Arc<ConnectionResolver>,
  transport: Arc<dyn HttpTransport>,
  settings: Arc<ExecutorConfig>,
}

impl NodeJob {
  #[instrument(
    name = "node_execute",
    skip(self),
    fields(
      execution_id = %self.execution_id,
      node_id = %self.node_id,
      node_type = %self.kind,
    )
  )]
  async fn run(self) -> Result<Value, RunnerError> {
    let resolved = try_join_all(
      self
        .connection_ids
        .iter()
        .map(|id| self.resolver.resolve(id)),
    )
    .await?;

    let ctx = RunContext {
      execution_id: self.execution_id,
      node_id: self.node_id,
      ancestors: self.ancestors,
      context: self.context,
      connections: self.connection_ids.into_iter().zip(resolved).collect(),
      transport: self.transport,
      config: self.settings,
    };

    let config = resolve_value(&self.config, &ctx, &self.policy)?;
    self.runner.run(config, &ctx).await
  }
}

/// Derive the run status from the written step results.
///
/// `partial` means some node outside the trigger and monitors succeeded
/// without feeding any failed node.
fn run_status(flow: &Flow, steps: &[StepResult]) -> RunStatus {
  if steps.iter().any(|s| s.status == StepStatus::Cancelled) {
    return RunStatus::Cancelled;
  }

  let failed: Vec<&str> = steps
    .iter()
    .filter(|s| s.status == StepStatus::Failed)
    .map(|s| s.node_id.as_str())
    .collect();
  if failed.is_empty() {
    return RunStatus::Completed;
  }

  let feeds_failure: HashSet<String> = failed
    .iter()
    .flat_map(|id| flow.graph().ancestors(id))
    .collect();
  let independent_success = steps.iter().any(|s| {
    s.is_succeeded()
      && !matches!(s.node_type, NodeKind::Trigger | NodeKind::Monitor)
      && !feeds_failure.contains(&s.node_id)
  });

  if independent_success {
    RunStatus::Partial
  } else {
    RunStatus::Failed
  }
}
