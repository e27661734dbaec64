//! Runtime error types.

use pipewright_catalog::CatalogError;
use pipewright_sandbox::SandboxFault;
use pipewright_workflow::DefinitionError;

/// Errors from the per-run context store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
  /// The key was already written during this run.
  #[error("context entry '{key}' already exists")]
  DuplicateKey { key: String },

  /// A segment of the path is absent or not traversable.
  #[error("path not found in context: {path}")]
  PathNotFound { path: String },
}

/// Why a single task attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TaskErrorKind {
  /// The runtime could not be resolved.
  #[error(transparent)]
  Catalog(#[from] CatalogError),

  /// The module misbehaved.
  #[error(transparent)]
  Fault(#[from] SandboxFault),

  /// The module ran and reported a failure in an `error` envelope.
  #[error("{message}")]
  Reported { message: String },

  #[error(transparent)]
  Context(#[from] ContextError),

  /// A configuration template failed to render.
  #[error("template error: {message}")]
  Template { message: String },

  /// The resolved configuration does not fit the runtime's declared schema.
  #[error("config does not match schema: {message}")]
  Schema { message: String },

  #[error("cancelled")]
  Cancelled,

  #[error("task panicked: {message}")]
  Panicked { message: String },
}

impl TaskErrorKind {
  /// Short stable name used in reports and logs.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Catalog(_) => "catalog",
      Self::Fault(fault) => fault.kind(),
      Self::Reported { .. } => "task_error",
      Self::Context(_) => "context",
      Self::Template { .. } => "template",
      Self::Schema { .. } => "schema",
      Self::Cancelled => "cancelled",
      Self::Panicked { .. } => "panicked",
    }
  }
}

/// A failed task attempt, with the task and runtime it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("task '{task_id}' ({runtime}) failed: {kind}")]
pub struct TaskError {
  pub task_id: String,
  pub runtime: String,
  #[source]
  pub kind: TaskErrorKind,
}

impl TaskError {
  pub fn new(task_id: impl Into<String>, runtime: impl Into<String>, kind: TaskErrorKind) -> Self {
    Self {
      task_id: task_id.into(),
      runtime: runtime.into(),
      kind,
    }
  }

  /// The sandbox or module infrastructure failed, rather than the task logic.
  pub fn is_fault(&self) -> bool {
    matches!(self.kind, TaskErrorKind::Fault(_) | TaskErrorKind::Panicked { .. })
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self.kind, TaskErrorKind::Cancelled)
  }
}

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  #[error(transparent)]
  Definition(#[from] DefinitionError),

  #[error("invalid scheduler config: {message}")]
  InvalidConfig { message: String },
}
