use chrono::{DateTime, Utc};
use pipewright_artifact::ArtifactDigest;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Where a runtime came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSource {
  /// Shipped with the host.
  Builtin,
  /// Registered at runtime.
  Custom,
}

/// A persisted catalog record.
///
/// Stored as `entries/<name>.json` under the catalog root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub name: String,
  pub source: RuntimeSource,
  #[serde(default)]
  pub description: String,
  /// JSON Schema describing the runtime's `config` object.
  #[serde(default)]
  pub config_schema: serde_json::Value,
  pub artifact_hash: ArtifactDigest,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Caller-supplied metadata for a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
  pub name: String,
  pub source: RuntimeSource,
  pub description: String,
  pub config_schema: serde_json::Value,
  pub created_by: Option<String>,
}

impl NewEntry {
  /// Metadata for a custom runtime with no description or schema.
  pub fn custom(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      source: RuntimeSource::Custom,
      description: String::new(),
      config_schema: serde_json::Value::Null,
      created_by: None,
    }
  }

  /// Metadata for a builtin runtime with no description or schema.
  pub fn builtin(name: impl Into<String>) -> Self {
    Self {
      source: RuntimeSource::Builtin,
      ..Self::custom(name)
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn with_config_schema(mut self, schema: serde_json::Value) -> Self {
    self.config_schema = schema;
    self
  }

  pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
    self.created_by = Some(created_by.into());
    self
  }

  pub(crate) fn into_entry(self, artifact_hash: ArtifactDigest) -> CatalogEntry {
    CatalogEntry {
      name: self.name,
      source: self.source,
      description: self.description,
      config_schema: self.config_schema,
      artifact_hash,
      created_by: self.created_by,
      created_at: Utc::now(),
    }
  }
}

/// Check that a runtime name is safe to use as a file name.
pub fn validate_name(name: &str) -> Result<(), CatalogError> {
  let reason = if name.is_empty() {
    Some("name must not be empty")
  } else if name.contains(['/', '\\']) {
    Some("name must not contain path separators")
  } else if name.contains("..") {
    Some("name must not contain '..'")
  } else if name.starts_with('.') {
    Some("name must not start with '.'")
  } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
    Some("name must not contain whitespace or control characters")
  } else {
    None
  };

  match reason {
    Some(reason) => Err(CatalogError::InvalidName {
      name: name.to_string(),
      reason,
    }),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_name() {
    assert!(validate_name("echo").is_ok());
    assert!(validate_name("file_write-v2").is_ok());

    for bad in ["", "a/b", "a\\b", "..", "a..b", ".hidden", "has space", "tab\t"] {
      assert!(
        matches!(validate_name(bad), Err(CatalogError::InvalidName { .. })),
        "expected '{bad}' to be rejected"
      );
    }
  }

  #[test]
  fn test_entry_serialization() {
    let entry = NewEntry::builtin("echo")
      .with_description("echoes its input")
      .into_entry(ArtifactDigest::of(b"wasm"));

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["source"], "builtin");
    assert_eq!(value["artifact_hash"], ArtifactDigest::of(b"wasm").to_string());
    assert!(value.get("created_by").is_none());

    let back: CatalogEntry = serde_json::from_value(value).unwrap();
    assert_eq!(back, entry);
  }
}
