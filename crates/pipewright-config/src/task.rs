use serde::{Deserialize, Serialize};

/// A single task record in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  pub id: String,
  /// Catalog name of the runtime that executes this task.
  pub runtime: String,
  /// Free-form configuration handed to the runtime. String values may contain
  /// `{{ path }}` references into the run context.
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub memory_limit_bytes: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_delay_ms: Option<u64>,
}
