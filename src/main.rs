use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conex_config::FlowDef;
use conex_connection::InMemoryConnectionStore;
use conex_host_http::ReqwestTransport;
use conex_runtime::{ExecutorConfig, FlowExecutor, RunStatus};

/// Conex - runs CRM automation flows
#[derive(Parser)]
#[command(name = "conex")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.conex)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log at debug level
  #[arg(long, short, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a flow with a JSON payload read from stdin
  Run {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,

    /// Connections file (JSON array, default: <data-dir>/connections.json)
    #[arg(long)]
    connections: Option<PathBuf>,

    /// Executor config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeout for each outbound request
    #[arg(long)]
    timeout_secs: Option<u64>,
  },

  /// Check a flow definition without running it
  Validate {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".conex"),
  };

  match cli.command {
    Some(Commands::Run {
      flow_file,
      connections,
      config,
      timeout_secs,
    }) => {
      let connections = connections.unwrap_or_else(|| data_dir.join("connections.json"));
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_flow(flow_file, connections, config, timeout_secs))
    }
    Some(Commands::Validate { flow_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(validate_flow(flow_file))
    }
    None => {
      println!("conex - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };
  // stdout carries the execution record
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

async fn read_flow(flow_file: &Path) -> Result<FlowDef> {
  let content = tokio::fs::read_to_string(flow_file)
    .await
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))
}

async fn load_config(path: Option<&Path>, timeout_secs: Option<u64>) -> Result<ExecutorConfig> {
  let mut config = match path {
    Some(path) => {
      let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?
    }
    None => ExecutorConfig::default(),
  };
  if let Some(secs) = timeout_secs {
    config.http_timeout = Duration::from_secs(secs);
  }
  Ok(config)
}

async fn load_connections(path: &Path) -> Result<InMemoryConnectionStore> {
  if !tokio::fs::try_exists(path).await.unwrap_or(false) {
    info!(path = %path.display(), "no connections file, running without connections");
    return Ok(InMemoryConnectionStore::new());
  }
  let store = InMemoryConnectionStore::from_json_file(path)
    .await
    .context("failed to load connections")?;
  info!(path = %path.display(), count = store.len(), "connections_loaded");
  Ok(store)
}

async fn run_flow(
  flow_file: PathBuf,
  connections_file: PathBuf,
  config_file: Option<PathBuf>,
  timeout_secs: Option<u64>,
) -> Result<ExitCode> {
  let def = read_flow(&flow_file).await?;
  let config = load_config(config_file.as_deref(), timeout_secs).await?;
  let connections = load_connections(&connections_file).await?;
  let payload = read_payload_from_stdin()?;

  let executor = FlowExecutor::new(
    config,
    Arc::new(ReqwestTransport::new()),
    Arc::new(connections),
  );

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      on_interrupt.cancel();
    }
  });

  let record = executor
    .execute(&def, payload, cancel)
    .await
    .context("flow rejected")?;

  println!("{}", serde_json::to_string_pretty(&record)?);

  Ok(match record.status {
    RunStatus::Completed => ExitCode::SUCCESS,
    _ => ExitCode::FAILURE,
  })
}

async fn validate_flow(flow_file: PathBuf) -> Result<ExitCode> {
  let def = read_flow(&flow_file).await?;
  let executor = FlowExecutor::new(
    ExecutorConfig::default(),
    Arc::new(ReqwestTransport::new()),
    Arc::new(InMemoryConnectionStore::new()),
  );
  executor.validate(&def).context("invalid flow")?;
  eprintln!("Flow '{}' is valid ({} nodes)", def.id, def.nodes.len());
  Ok(ExitCode::SUCCESS)
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}
