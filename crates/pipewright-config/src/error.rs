use std::path::PathBuf;

use thiserror::Error;

/// A workflow document that could not be read or deserialized.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid TOML: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unsupported workflow file extension: {}", path.display())]
  UnsupportedFormat { path: PathBuf },
}
