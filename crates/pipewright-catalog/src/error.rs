use pipewright_artifact::{ArtifactDigest, ArtifactError};
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("runtime not found: {name}")]
  NotFound { name: String },

  /// A custom registration tried to replace a builtin runtime.
  #[error("runtime name already taken by a builtin: {name}")]
  DuplicateName { name: String },

  #[error("runtime '{name}' is already registered with {existing}, refusing {incoming} without overwrite")]
  HashMismatch {
    name: String,
    existing: ArtifactDigest,
    incoming: ArtifactDigest,
  },

  #[error("runtime '{name}' is referenced by {runs} running workflow(s)")]
  InUse { name: String, runs: usize },

  #[error("invalid runtime name '{name}': {reason}")]
  InvalidName { name: String, reason: &'static str },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid catalog entry: {0}")]
  InvalidEntry(#[from] serde_json::Error),

  #[error("artifact store error: {0}")]
  Artifact(#[from] ArtifactError),
}
