use std::path::PathBuf;

use pipewright_config::ConfigError;
use thiserror::Error;

/// Reasons a workflow definition is rejected before anything runs.
#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("failed to parse workflow definition: {0}")]
  Parse(#[from] ConfigError),

  #[error("workflow name must not be empty")]
  EmptyName,

  #[error("workflow '{workflow}' has no tasks")]
  NoTasks { workflow: String },

  #[error("task id must not be empty")]
  EmptyId,

  #[error("task id '{task_id}' is reserved")]
  ReservedId { task_id: String },

  #[error("duplicate task id: {task_id}")]
  DuplicateId { task_id: String },

  #[error("task '{task_id}' has an empty runtime name")]
  EmptyRuntime { task_id: String },

  #[error("task '{task_id}' depends on unknown task '{dependency}'")]
  UnknownDependency { task_id: String, dependency: String },

  #[error("dependency cycle detected among tasks: {}", task_ids.join(", "))]
  Cycle { task_ids: Vec<String> },

  #[error("task '{task_id}' references '{reference}', which cannot have completed before it runs")]
  UnreachableReference { task_id: String, reference: String },

  #[error("invalid schedule: {reason}")]
  InvalidSchedule { reason: String },

  #[error("invalid trigger: {reason}")]
  InvalidTrigger { reason: String },

  #[error("workflow '{name}' is already defined in {}", first.display())]
  DuplicateWorkflow { name: String, first: PathBuf },

  #[error("failed to read workflow directory {}: {source}", path.display())]
  ReadDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
