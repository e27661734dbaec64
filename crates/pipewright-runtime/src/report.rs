//! Task states and the run outcome report.

use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::error::TaskError;

/// Lifecycle state of a task within one run. Owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
  Skipped,
  Cancelled,
}

impl TaskState {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
    )
  }
}

/// Aggregate status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// Every task succeeded.
  Succeeded,
  Failed,
  /// Aborted by a cancel signal or the run timeout.
  Cancelled,
}

/// Serializable description of why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
  /// Stable class such as `timeout`, `malformed_output` or `task_error`.
  pub kind: String,
  pub message: String,
}

impl From<&TaskError> for TaskFailure {
  fn from(err: &TaskError) -> Self {
    Self {
      kind: err.kind.name().to_string(),
      message: err.kind.to_string(),
    }
  }
}

/// Final record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
  pub id: String,
  pub runtime: String,
  pub state: TaskState,
  /// Number of dispatches, retries included.
  pub attempts: u32,
  /// Context key holding the task's output, set when it succeeded.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_ref: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<TaskFailure>,
  /// The upstream task whose failure or skip caused this skip.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skipped_because: Option<String>,
}

/// Outcome of a run, with one entry per task in definition order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id: String,
  pub workflow: String,
  pub run_status: RunStatus,
  pub tasks: Vec<TaskReport>,
}

impl RunReport {
  pub fn task(&self, id: &str) -> Option<&TaskReport> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn is_success(&self) -> bool {
    self.run_status == RunStatus::Succeeded
  }

  /// Every task that did not succeed.
  pub fn unsucceeded(&self) -> impl Iterator<Item = &TaskReport> {
    self
      .tasks
      .iter()
      .filter(|t| t.state != TaskState::Succeeded)
  }

  /// Ids of tasks in the given state, in definition order.
  pub fn ids_in(&self, state: TaskState) -> Vec<&str> {
    self
      .tasks
      .iter()
      .filter(|t| t.state == state)
      .map(|t| t.id.as_str())
      .collect()
  }
}

/// What a finished run hands back: the report plus the final context.
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub report: RunReport,
  /// Context as it stood when the run ended, `input` included.
  pub context: ContextSnapshot,
}
