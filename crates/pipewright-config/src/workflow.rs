use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::DocumentFormat;
use crate::schedule::{ScheduleDef, TriggerDef};
use crate::task::TaskDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub tasks: Vec<TaskDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub schedule: Option<ScheduleDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub triggers: Option<TriggerDef>,
}

/// TOML files keep the workflow under a `[workflow]` table.
#[derive(Deserialize)]
struct WorkflowFile {
  workflow: WorkflowDef,
}

impl WorkflowDef {
  /// Parse a workflow definition from its JSON document form.
  pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(raw)?)
  }

  /// Parse a workflow definition from a TOML file body.
  pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
    let file: WorkflowFile = toml::from_str(raw)?;
    Ok(file.workflow)
  }

  pub fn parse(raw: &str, format: DocumentFormat) -> Result<Self, ConfigError> {
    match format {
      DocumentFormat::Json => Self::from_json(raw),
      DocumentFormat::Toml => Self::from_toml(raw),
    }
  }

  /// Read a definition file, choosing the format by extension.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let format = DocumentFormat::from_path(path)?;
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&raw, format)
  }
}
