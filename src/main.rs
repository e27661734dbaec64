use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pipewright_catalog::{FsCatalog, NewEntry, RuntimeCatalog, RuntimeSource};
use pipewright_runtime::{Scheduler, SchedulerConfig};
use pipewright_sandbox::{Limits, WasmSandbox};
use pipewright_workflow::{DocumentFormat, WorkflowGraph};

/// Pipewright - sandboxed DAG workflows over a runtime catalog
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.pipewright)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Run {
    /// Path to the workflow file (.json or .toml)
    workflow_file: PathBuf,

    /// Read the input payload from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Maximum number of tasks running at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Default per-task timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Default per-task memory cap in MiB
    #[arg(long)]
    memory_mb: Option<u64>,

    /// Abort the whole run after this many milliseconds
    #[arg(long)]
    run_timeout_ms: Option<u64>,
  },

  /// Parse and validate a workflow without running it
  Validate {
    /// Path to the workflow file (.json or .toml)
    workflow_file: PathBuf,
  },

  /// Load and validate every workflow file in a directory
  Workflows {
    /// Directory of .json and .toml workflow files
    dir: PathBuf,
  },

  /// Inspect or modify the runtime catalog
  Catalog {
    #[command(subcommand)]
    action: CatalogAction,
  },
}

#[derive(Subcommand)]
enum CatalogAction {
  /// List registered runtimes
  List,

  /// Show one runtime's catalog entry
  Inspect { name: String },

  /// Register a wasm module under a runtime name
  Register {
    name: String,

    /// Path to the compiled module
    module: PathBuf,

    #[arg(long)]
    description: Option<String>,

    /// JSON Schema file for the runtime's config
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Mark the runtime as shipped with the host
    #[arg(long)]
    builtin: bool,

    #[arg(long)]
    created_by: Option<String>,

    /// Replace an existing runtime's artifact or metadata
    #[arg(long)]
    overwrite: bool,
  },

  /// Remove a runtime
  Remove { name: String },
}

fn main() -> Result<ExitCode> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".pipewright"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Run {
      workflow_file,
      input,
      concurrency,
      timeout_ms,
      memory_mb,
      run_timeout_ms,
    }) => {
      let mut config = SchedulerConfig::default();
      if let Some(concurrency) = concurrency {
        config = config.with_max_concurrency(concurrency);
      }
      let mut limits = Limits::default();
      if let Some(ms) = timeout_ms {
        limits = limits.with_timeout(Duration::from_millis(ms));
      }
      if let Some(mb) = memory_mb {
        limits = limits.with_memory_cap(mib_to_bytes(mb)?);
      }
      config = config.with_limits(limits);
      if let Some(ms) = run_timeout_ms {
        config = config.with_run_timeout(Duration::from_millis(ms));
      }

      rt.block_on(run_workflow(workflow_file, input, config, data_dir))
    }
    Some(Commands::Validate { workflow_file }) => {
      rt.block_on(validate_workflow(workflow_file))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Workflows { dir }) => list_workflows(&dir),
    Some(Commands::Catalog { action }) => {
      rt.block_on(catalog_command(action, data_dir))?;
      Ok(ExitCode::SUCCESS)
    }
    None => {
      println!("pipewright - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

fn mib_to_bytes(mb: u64) -> Result<u64> {
  mb.checked_mul(1024 * 1024)
    .with_context(|| format!("memory cap of {mb} MiB does not fit in 64 bits of bytes"))
}

fn open_catalog(data_dir: &Path) -> FsCatalog {
  FsCatalog::new(data_dir.join("catalog"))
}

async fn load_workflow(workflow_file: &Path) -> Result<WorkflowGraph> {
  let format = DocumentFormat::from_path(workflow_file)?;
  let content = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  pipewright_workflow::parse_document(&content, format)
    .with_context(|| format!("invalid workflow: {}", workflow_file.display()))
}

async fn run_workflow(
  workflow_file: PathBuf,
  input: Option<PathBuf>,
  config: SchedulerConfig,
  data_dir: PathBuf,
) -> Result<ExitCode> {
  let workflow = load_workflow(&workflow_file).await?;
  eprintln!("Loaded workflow: {} ({} tasks)", workflow.name(), workflow.len());

  let payload = match input {
    Some(path) => read_payload_from_file(&path).await?,
    None => read_payload_from_stdin()?,
  };

  let catalog = Arc::new(open_catalog(&data_dir));
  let sandbox = Arc::new(WasmSandbox::new().context("failed to create sandbox")?);
  let scheduler = Scheduler::new(catalog, sandbox, config);

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupted, cancelling run");
      on_signal.cancel();
    }
  });

  let outcome = scheduler
    .run(&workflow, payload, cancel)
    .await
    .context("workflow run failed")?;

  eprintln!(
    "Run {} finished: {:?}",
    outcome.report.run_id, outcome.report.run_status
  );
  println!("{}", serde_json::to_string_pretty(&outcome.report)?);

  if outcome.report.is_success() {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::FAILURE)
  }
}

async fn validate_workflow(workflow_file: PathBuf) -> Result<()> {
  let workflow = load_workflow(&workflow_file).await?;
  eprintln!("Workflow '{}' is valid", workflow.name());
  if let Some(description) = workflow.description() {
    eprintln!("  {description}");
  }
  if let Some(schedule) = workflow.schedule() {
    eprintln!("  schedule: {} ({})", schedule.cron, schedule.timezone);
  }
  if let Some(triggers) = workflow.triggers() {
    eprintln!("  trigger: {}", triggers.on_event);
  }

  for task_id in workflow.topological_order() {
    println!("{task_id}");
  }
  Ok(())
}

fn list_workflows(dir: &Path) -> Result<ExitCode> {
  let mut rejected = 0;
  for file in pipewright_workflow::load_dir(dir)? {
    match file.result {
      Ok(workflow) => println!(
        "{}\t{}\t{} tasks\t{}",
        workflow.name(),
        file.path.display(),
        workflow.len(),
        workflow.schedule().map_or("-", |s| s.cron.as_str())
      ),
      Err(e) => {
        rejected += 1;
        eprintln!("{}: {e}", file.path.display());
      }
    }
  }

  if rejected == 0 {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::FAILURE)
  }
}

async fn catalog_command(action: CatalogAction, data_dir: PathBuf) -> Result<()> {
  let catalog = open_catalog(&data_dir);

  match action {
    CatalogAction::List => {
      for entry in catalog.list().await.context("failed to list catalog")? {
        println!(
          "{}\t{}\t{}\t{}",
          entry.name,
          source_label(entry.source),
          entry.artifact_hash,
          entry.description
        );
      }
    }
    CatalogAction::Inspect { name } => {
      let entry = catalog.inspect(&name).await?;
      println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    CatalogAction::Register {
      name,
      module,
      description,
      schema,
      builtin,
      created_by,
      overwrite,
    } => {
      let bytes = tokio::fs::read(&module)
        .await
        .with_context(|| format!("failed to read module: {}", module.display()))?;

      let mut entry = if builtin {
        NewEntry::builtin(name)
      } else {
        NewEntry::custom(name)
      };
      if let Some(description) = description {
        entry = entry.with_description(description);
      }
      if let Some(path) = schema {
        entry = entry.with_config_schema(read_payload_from_file(&path).await?);
      }
      if let Some(created_by) = created_by {
        entry = entry.with_created_by(created_by);
      }

      let registered = catalog
        .register(entry, Bytes::from(bytes), overwrite)
        .await
        .context("failed to register runtime")?;
      eprintln!(
        "Registered {} ({})",
        registered.name, registered.artifact_hash
      );
      println!("{}", serde_json::to_string_pretty(&registered)?);
    }
    CatalogAction::Remove { name } => {
      catalog
        .remove(&name)
        .await
        .with_context(|| format!("failed to remove runtime '{name}'"))?;
      eprintln!("Removed {name}");
    }
  }

  Ok(())
}

fn source_label(source: RuntimeSource) -> &'static str {
  match source {
    RuntimeSource::Builtin => "builtin",
    RuntimeSource::Custom => "custom",
  }
}

async fn read_payload_from_file(path: &Path) -> Result<serde_json::Value> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;

  if content.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&content).with_context(|| format!("failed to parse JSON: {}", path.display()))
  }
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
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
}
