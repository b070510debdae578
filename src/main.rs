use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tidewave_backend::{
  LocalBackend, LocalBackendConfig, OrchestrationBackend, TaskDefinition, WorkflowDefinition,
};
use tidewave_dispatch::{
  DEFAULT_MAX_ATTEMPTS, DispatchMode, Dispatcher, DispatcherConfig, QueueWorker,
  QueueWorkerConfig, StoreQueue,
};
use tidewave_graph::{DependencyGraph, build_graph, detect_cycles};
use tidewave_inventory::Snapshot;
use tidewave_pipeline::SimulatedSteps;
use tidewave_planner::{
  BlockerInputs, PlannerConfig, annotate_blocking, build_dashboard, build_graph_doc,
  composite_score, detect_blockers, plan, write_documents,
};
use tidewave_store::{SqliteStore, Store};

/// Tidewave - planning and dispatch for automated code migrations
#[derive(Parser)]
#[command(name = "tidewave")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tidewave)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the dependency graph and write the wave-plan documents
  Plan {
    /// Path to the inventory JSON file
    #[arg(long)]
    inventory: PathBuf,

    /// Cross-reference documents (repeatable)
    #[arg(long = "cross-ref")]
    cross_refs: Vec<PathBuf>,

    /// Schema-conflict document
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Routing document
    #[arg(long)]
    routes: Option<PathBuf>,

    /// Prior-run status document
    #[arg(long)]
    status: Option<PathBuf>,

    /// Directory the output documents are written to
    #[arg(long)]
    output: PathBuf,

    /// Maximum units per wave
    #[arg(long, default_value_t = 10)]
    max_wave_size: usize,
  },

  /// Dispatch ready units until the backlog drains or ctrl-c
  Dispatch {
    /// Path to the inventory JSON file
    #[arg(long)]
    inventory: PathBuf,

    /// Prior-run status document, to skip already-completed units
    #[arg(long)]
    status: Option<PathBuf>,

    /// Write simulation artifacts instead of queueing real work
    #[arg(long)]
    simulate: bool,

    /// Directory for simulation artifacts (default: <data_dir>/simulation)
    #[arg(long)]
    simulation_dir: Option<PathBuf>,

    /// Maximum units in flight at once
    #[arg(long, default_value_t = 5)]
    max_concurrent: usize,

    /// SQLite database path (default: <data_dir>/tidewave.db)
    #[arg(long)]
    db: Option<PathBuf>,
  },

  /// Print the execution rollup from the store
  Status {
    /// SQLite database path (default: <data_dir>/tidewave.db)
    #[arg(long)]
    db: Option<PathBuf>,
  },
}

const WORKFLOW_ID: &str = "unit-migration";

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_target(false))
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tidewave"),
  };

  match cli.command {
    Some(Commands::Plan {
      inventory,
      cross_refs,
      schema,
      routes,
      status,
      output,
      max_wave_size,
    }) => run_plan(
      inventory,
      cross_refs,
      schema,
      routes,
      status,
      output,
      max_wave_size,
    ),
    Some(Commands::Dispatch {
      inventory,
      status,
      simulate,
      simulation_dir,
      max_concurrent,
      db,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_dispatch(
        inventory,
        status,
        simulate,
        simulation_dir.unwrap_or_else(|| data_dir.join("simulation")),
        max_concurrent,
        db.unwrap_or_else(|| data_dir.join("tidewave.db")),
      ))
    }
    Some(Commands::Status { db }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_status(
        db.unwrap_or_else(|| data_dir.join("tidewave.db")),
      ))
    }
    None => {
      println!("tidewave - use --help to see available commands");
      Ok(())
    }
  }
}

#[allow(clippy::too_many_arguments)]
fn run_plan(
  inventory: PathBuf,
  cross_refs: Vec<PathBuf>,
  schema: Option<PathBuf>,
  routes: Option<PathBuf>,
  status: Option<PathBuf>,
  output: PathBuf,
  max_wave_size: usize,
) -> Result<()> {
  let snapshot = Snapshot::load(
    &inventory,
    &cross_refs,
    schema.as_deref(),
    routes.as_deref(),
    status.as_deref(),
  )
  .context("failed to load snapshot")?;

  let edges = build_graph(&snapshot.units, &snapshot.cross_refs);
  let cycles = detect_cycles(&edges);
  let blockers = detect_blockers(&snapshot, &BlockerInputs { cycles: &cycles });

  let config = PlannerConfig {
    max_wave_size,
    ..PlannerConfig::default()
  };
  let wave_plan = plan(&snapshot.units, &edges, &blockers, &config);
  let graph_doc = build_graph_doc(&snapshot.units, &edges, &blockers);
  let dashboard = build_dashboard(&snapshot.units, &wave_plan, &blockers);

  write_documents(&output, &wave_plan, &graph_doc, &blockers, &dashboard)
    .context("failed to write plan documents")?;

  println!(
    "planned {} units into {} waves ({} effort days, {} blockers) -> {}",
    wave_plan.total_units,
    wave_plan.total_waves,
    wave_plan.estimated_total_effort_days,
    blockers.len(),
    output.display()
  );
  Ok(())
}

async fn run_dispatch(
  inventory: PathBuf,
  status: Option<PathBuf>,
  simulate: bool,
  simulation_dir: PathBuf,
  max_concurrent: usize,
  db: PathBuf,
) -> Result<()> {
  let snapshot = Snapshot::load(
    &inventory,
    &[] as &[&std::path::Path],
    None,
    None,
    status.as_deref(),
  )
  .context("failed to load snapshot")?;

  // Score the backlog so dispatch order matches the plan.
  let edges = build_graph(&snapshot.units, &snapshot.cross_refs);
  let graph = DependencyGraph::new(&edges);
  let mut units = snapshot.units;
  annotate_blocking(&mut units, &graph);
  for unit in &mut units {
    unit.score = composite_score(unit);
  }

  let cancel = CancellationToken::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        cancel.cancel();
      }
    });
  }

  let mut dispatcher = if simulate {
    Dispatcher::new(
      units,
      DispatchMode::Simulated {
        dir: simulation_dir.clone(),
        delay: Duration::from_millis(50),
      },
      DispatcherConfig { max_concurrent },
    )
  } else {
    let store = open_store(&db).await?;

    let backend = LocalBackend::connect(
      store.clone(),
      Arc::new(SimulatedSteps::default()),
      LocalBackendConfig::default(),
    )
    .await
    .context("failed to initialize backend")?;
    backend
      .deploy(migration_workflow())
      .await
      .context("failed to deploy migration workflow")?;

    let dispatcher = Dispatcher::new(
      units,
      DispatchMode::Live {
        queue: Arc::new(StoreQueue::new(store.clone())),
        max_attempts: DEFAULT_MAX_ATTEMPTS,
      },
      DispatcherConfig { max_concurrent },
    );

    let worker = QueueWorker::new(
      store,
      Arc::new(backend.clone()),
      WORKFLOW_ID,
      dispatcher.event_sender(),
      QueueWorkerConfig::default(),
    );
    tokio::spawn(worker.run(backend.subscribe(), cancel.clone()));
    dispatcher
  };

  dispatcher.run(cancel).await.context("dispatch failed")?;

  let failures = dispatcher.failures();
  if failures.is_empty() {
    println!("dispatch complete, all units migrated");
  } else {
    println!("dispatch complete with {} failures:", failures.len());
    let mut failed: Vec<_> = failures.iter().collect();
    failed.sort_by_key(|(id, _)| id.as_str());
    for (unit_id, reason) in failed {
      println!("  {unit_id}: {reason}");
    }
  }
  if simulate {
    println!("simulation artifacts in {}", simulation_dir.display());
  }
  Ok(())
}

async fn run_status(db: PathBuf) -> Result<()> {
  let store = open_store(&db).await?;
  let executions = store
    .list_executions(WORKFLOW_ID)
    .await
    .context("failed to list executions")?;

  if executions.is_empty() {
    println!("no executions recorded");
    return Ok(());
  }

  let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
  for execution in &executions {
    *counts
      .entry(format!("{:?}", execution.status).to_lowercase())
      .or_insert(0) += 1;
  }

  println!("{} executions:", executions.len());
  for (status, count) in counts {
    println!("  {status}: {count}");
  }
  println!();
  for execution in executions.iter().take(20) {
    println!(
      "  {}  {:<12}  {}  {}",
      execution.started_at.format("%Y-%m-%d %H:%M:%S"),
      format!("{:?}", execution.status).to_lowercase(),
      execution.unit_id,
      execution.error.as_deref().unwrap_or("")
    );
  }
  Ok(())
}

async fn open_store(db: &std::path::Path) -> Result<Arc<dyn Store>> {
  if let Some(parent) = db.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::connect(&format!("sqlite://{}", db.display()))
    .await
    .with_context(|| format!("failed to open database {}", db.display()))?;
  store
    .init_schema()
    .await
    .context("failed to initialize database schema")?;
  Ok(Arc::new(store))
}

fn migration_workflow() -> WorkflowDefinition {
  WorkflowDefinition::new(
    WORKFLOW_ID,
    vec![TaskDefinition {
      id: "pipeline".to_string(),
      depends_on: vec![],
      params: serde_json::Value::Null,
    }],
  )
}
