//! Binding tasks to runnable actions.
//!
//! The [`ActionBinder`] turns a [`TaskSpec`] into a [`BoundAction`]: a
//! self-contained closure over the task's runtime name, configuration and
//! limits. Invoking it resolves the runtime, renders the configuration
//! against a fresh context snapshot, runs the module, and records the output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pipewright_catalog::RuntimeCatalog;
use pipewright_sandbox::{InputEnvelope, Limits, Sandbox};
use pipewright_workflow::TaskSpec;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::context::ContextStore;
use crate::error::{TaskError, TaskErrorKind};
use crate::template::{check_shape, resolve_config};

/// Builds [`BoundAction`]s that share a catalog, sandbox and context store.
#[derive(Clone)]
pub struct ActionBinder {
  catalog: Arc<dyn RuntimeCatalog>,
  sandbox: Arc<dyn Sandbox>,
  context: Arc<ContextStore>,
  limits: Limits,
}

impl ActionBinder {
  /// `limits` are the defaults; tasks may override timeout and memory.
  pub fn new(
    catalog: Arc<dyn RuntimeCatalog>,
    sandbox: Arc<dyn Sandbox>,
    context: Arc<ContextStore>,
    limits: Limits,
  ) -> Self {
    Self {
      catalog,
      sandbox,
      context,
      limits,
    }
  }

  pub fn bind(&self, task: &TaskSpec) -> BoundAction {
    let mut limits = self.limits;
    if let Some(ms) = task.timeout_ms {
      limits.timeout = Duration::from_millis(ms);
    }
    if let Some(bytes) = task.memory_limit_bytes {
      limits.memory_cap_bytes = bytes;
    }

    BoundAction {
      task_id: task.id.clone(),
      runtime: task.runtime.clone(),
      config: task.config.clone(),
      limits,
      catalog: self.catalog.clone(),
      sandbox: self.sandbox.clone(),
      context: self.context.clone(),
    }
  }
}

/// One task, ready to be invoked any number of times.
pub struct BoundAction {
  task_id: String,
  runtime: String,
  config: Value,
  limits: Limits,
  catalog: Arc<dyn RuntimeCatalog>,
  sandbox: Arc<dyn Sandbox>,
  context: Arc<ContextStore>,
}

impl BoundAction {
  /// Run the task once and record its output in the context store.
  ///
  /// Nothing is written unless the module answers with an `ok` envelope.
  /// Cancelling drops the in-flight invocation.
  #[instrument(
    name = "task_invoke",
    skip(self, cancel),
    fields(task_id = %self.task_id, runtime = %self.runtime)
  )]
  pub async fn invoke(&self, cancel: &CancellationToken) -> Result<Value, TaskError> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(self.error(TaskErrorKind::Cancelled)),
      result = self.attempt() => result.map_err(|kind| self.error(kind)),
    }
  }

  async fn attempt(&self) -> Result<Value, TaskErrorKind> {
    let snapshot = self.context.snapshot();
    let artifact = self.catalog.resolve(&self.runtime).await?;

    let config = resolve_config(&self.config, &snapshot)?;
    check_shape(&config, artifact.config_schema())?;

    let envelope = InputEnvelope::new(config, snapshot.to_value());
    let started = Instant::now();
    let reply = self.sandbox.run(&artifact, &envelope, &self.limits).await?;
    debug!(
      elapsed_ms = started.elapsed().as_millis() as u64,
      status = ?reply.status,
      "sandbox_returned"
    );

    let output = reply
      .into_result()
      .map_err(|message| TaskErrorKind::Reported { message })?;
    self.context.insert(&self.task_id, output.clone())?;
    Ok(output)
  }

  /// Wrap a failure with this task's identity.
  pub fn error(&self, kind: TaskErrorKind) -> TaskError {
    TaskError::new(&self.task_id, &self.runtime, kind)
  }
}
