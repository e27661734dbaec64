use serde::{Deserialize, Serialize};

/// When a workflow should run on its own.
///
/// The runtime does not fire schedules; the metadata is validated and carried
/// for whatever host drives the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDef {
  /// Cron expression with five or six fields, e.g. `0 9 * * *`.
  pub cron: String,
  /// IANA timezone the expression is read in.
  #[serde(default = "default_timezone")]
  pub timezone: String,
}

fn default_timezone() -> String {
  "UTC".to_string()
}

/// Host events that should start the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
  pub on_event: String,
}
