use std::path::Path;

use crate::error::ConfigError;

/// Serialization of a workflow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
  /// A bare workflow object.
  Json,
  /// A file whose `[workflow]` table holds the workflow.
  Toml,
}

impl DocumentFormat {
  /// Pick the format from a file extension (`.json` or `.toml`).
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
      Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
      _ => Err(ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
      }),
    }
  }
}
