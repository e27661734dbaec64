use serde::{Deserialize, Serialize};

use pipewright_config::TaskDef;

/// A validated task inside a [`WorkflowGraph`](crate::WorkflowGraph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
  pub id: String,
  pub runtime: String,
  pub config: serde_json::Value,
  /// Direct dependencies, deduplicated, in declaration order.
  pub depends_on: Vec<String>,
  pub timeout_ms: Option<u64>,
  pub memory_limit_bytes: Option<u64>,
  /// Additional attempts after the first failure.
  pub max_retry_attempts: u32,
  pub retry_delay_ms: Option<u64>,
}

impl From<TaskDef> for TaskSpec {
  fn from(def: TaskDef) -> Self {
    let mut depends_on: Vec<String> = Vec::with_capacity(def.depends_on.len());
    for dep in def.depends_on {
      if !depends_on.contains(&dep) {
        depends_on.push(dep);
      }
    }

    Self {
      id: def.id,
      runtime: def.runtime,
      config: def.config,
      depends_on,
      timeout_ms: def.timeout_ms,
      memory_limit_bytes: def.memory_limit_bytes,
      max_retry_attempts: def.max_retry_attempts.unwrap_or(0),
      retry_delay_ms: def.retry_delay_ms,
    }
  }
}
