use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pipewright_artifact::ArtifactDigest;

use crate::entry::{CatalogEntry, NewEntry};
use crate::error::CatalogError;
use crate::usage::UsageTracker;

/// An immutable, resolved runtime: its catalog record plus the module bytes.
///
/// Later catalog mutations never affect a handle that was already handed out.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
  entry: Arc<CatalogEntry>,
  bytes: Bytes,
}

impl ArtifactHandle {
  pub fn new(entry: CatalogEntry, bytes: Bytes) -> Self {
    Self {
      entry: Arc::new(entry),
      bytes,
    }
  }

  pub fn name(&self) -> &str {
    &self.entry.name
  }

  pub fn digest(&self) -> &ArtifactDigest {
    &self.entry.artifact_hash
  }

  pub fn config_schema(&self) -> &serde_json::Value {
    &self.entry.config_schema
  }

  pub fn entry(&self) -> &CatalogEntry {
    &self.entry
  }

  pub fn bytes(&self) -> &Bytes {
    &self.bytes
  }
}

/// Registry of named runtimes.
#[async_trait]
pub trait RuntimeCatalog: Send + Sync {
  /// All entries, sorted by name.
  async fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

  /// Register an artifact under `entry.name`.
  ///
  /// Re-registering identical bytes returns the existing entry unchanged,
  /// unless `overwrite` is set, in which case the metadata is replaced. A
  /// different artifact under an existing name needs `overwrite`.
  async fn register(
    &self,
    entry: NewEntry,
    artifact: Bytes,
    overwrite: bool,
  ) -> Result<CatalogEntry, CatalogError>;

  /// Look up an entry by name.
  async fn inspect(&self, name: &str) -> Result<CatalogEntry, CatalogError>;

  /// Remove an entry. Fails with `InUse` while a run references it.
  async fn remove(&self, name: &str) -> Result<(), CatalogError>;

  /// Resolve a name to an executable handle.
  async fn resolve(&self, name: &str) -> Result<ArtifactHandle, CatalogError>;

  /// Tracker used for the soft in-use check on removal.
  fn usage(&self) -> &UsageTracker;
}
