use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use pipewright_artifact::{ArtifactDigest, ArtifactError, ArtifactStore, FsStore, stream_bytes};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{ArtifactHandle, RuntimeCatalog};
use crate::entry::{CatalogEntry, NewEntry, RuntimeSource, validate_name};
use crate::error::CatalogError;
use crate::usage::UsageTracker;

/// Filesystem-based runtime catalog.
///
/// Entries and artifacts are stored side by side:
/// ```text
/// {root}/
/// ├── entries/
/// │   ├── echo.json
/// │   └── http.json
/// └── artifacts/
///     └── sha256/
///         └── 2c26b46b68ffc68f...
/// ```
pub struct FsCatalog {
  root: PathBuf,
  artifacts: FsStore,
  /// Loaded module bytes keyed by digest, kept for the process lifetime.
  cache: RwLock<HashMap<ArtifactDigest, Bytes>>,
  /// Serializes register/remove so the name index stays consistent.
  write_lock: Mutex<()>,
  usage: UsageTracker,
}

impl FsCatalog {
  /// Open (or lazily create) a catalog at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      artifacts: FsStore::new(root.join("artifacts")),
      root,
      cache: RwLock::new(HashMap::new()),
      write_lock: Mutex::new(()),
      usage: UsageTracker::new(),
    }
  }

  fn entries_dir(&self) -> PathBuf {
    self.root.join("entries")
  }

  fn entry_path(&self, name: &str) -> PathBuf {
    self.entries_dir().join(format!("{name}.json"))
  }

  async fn read_entry(&self, name: &str) -> Result<Option<CatalogEntry>, CatalogError> {
    match fs::read_to_string(self.entry_path(name)).await {
      Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Write an entry via a temp file and rename so readers never see a torn record.
  async fn write_entry(&self, entry: &CatalogEntry) -> Result<(), CatalogError> {
    let dir = self.entries_dir();
    fs::create_dir_all(&dir).await?;

    let content = serde_json::to_vec_pretty(entry)?;
    let temp = dir.join(format!(".{}.json.tmp", entry.name));
    fs::write(&temp, content).await?;
    fs::rename(&temp, self.entry_path(&entry.name)).await?;
    Ok(())
  }

  /// Drop an artifact once no entry points at it any more.
  async fn collect_garbage(&self, digest: &ArtifactDigest) -> Result<(), CatalogError> {
    let still_referenced = self
      .list()
      .await?
      .iter()
      .any(|e| &e.artifact_hash == digest);
    if still_referenced {
      return Ok(());
    }

    match self.artifacts.delete(digest).await {
      Ok(()) | Err(ArtifactError::NotFound(_)) => {}
      Err(e) => return Err(e.into()),
    }
    self.cache_write().remove(digest);
    debug!(artifact_hash = %digest, "artifact_collected");
    Ok(())
  }

  fn cached(&self, digest: &ArtifactDigest) -> Option<Bytes> {
    let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
    cache.get(digest).cloned()
  }

  fn cache_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ArtifactDigest, Bytes>> {
    self.cache.write().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl RuntimeCatalog for FsCatalog {
  async fn list(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
    let mut entries = Vec::new();

    let dir = self.entries_dir();
    if !fs::try_exists(&dir).await? {
      return Ok(entries);
    }

    let mut dir_entries = fs::read_dir(&dir).await?;
    while let Some(dir_entry) = dir_entries.next_entry().await? {
      let path = dir_entry.path();
      let is_record = path.extension().is_some_and(|ext| ext == "json")
        && !dir_entry.file_name().to_string_lossy().starts_with('.');
      if !is_record {
        continue;
      }

      let content = fs::read_to_string(&path).await?;
      match serde_json::from_str::<CatalogEntry>(&content) {
        Ok(entry) => entries.push(entry),
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable catalog entry"),
      }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
  }

  #[instrument(
    name = "catalog_register",
    skip(self, entry, artifact),
    fields(name = %entry.name, source = ?entry.source)
  )]
  async fn register(
    &self,
    entry: NewEntry,
    artifact: Bytes,
    overwrite: bool,
  ) -> Result<CatalogEntry, CatalogError> {
    validate_name(&entry.name)?;
    let digest = ArtifactDigest::of(&artifact);

    let _guard = self.write_lock.lock().await;
    let existing = self.read_entry(&entry.name).await?;

    if let Some(existing) = &existing {
      if existing.artifact_hash == digest && !overwrite {
        debug!(artifact_hash = %digest, "runtime already registered with identical artifact");
        return Ok(existing.clone());
      }
      if existing.artifact_hash != digest && !overwrite {
        if existing.source == RuntimeSource::Builtin && entry.source == RuntimeSource::Custom {
          return Err(CatalogError::DuplicateName {
            name: entry.name.clone(),
          });
        }
        return Err(CatalogError::HashMismatch {
          name: entry.name.clone(),
          existing: existing.artifact_hash.clone(),
          incoming: digest,
        });
      }
    }

    let aliases: Vec<String> = self
      .list()
      .await?
      .into_iter()
      .filter(|e| e.artifact_hash == digest && e.name != entry.name)
      .map(|e| e.name)
      .collect();
    if !aliases.is_empty() {
      warn!(
        artifact_hash = %digest,
        aliases = ?aliases,
        "artifact is already registered under another name"
      );
    }

    let stored = self.artifacts.put(stream_bytes(artifact.clone())).await?;
    if stored != digest {
      return Err(
        ArtifactError::DigestMismatch {
          expected: digest,
          actual: stored,
        }
        .into(),
      );
    }

    let record = entry.into_entry(digest.clone());
    self.write_entry(&record).await?;
    self.cache_write().insert(digest.clone(), artifact);

    if let Some(previous) = existing
      && previous.artifact_hash != digest
    {
      self.collect_garbage(&previous.artifact_hash).await?;
    }

    info!(artifact_hash = %digest, overwrite, "runtime_registered");
    Ok(record)
  }

  async fn inspect(&self, name: &str) -> Result<CatalogEntry, CatalogError> {
    validate_name(name)?;
    self
      .read_entry(name)
      .await?
      .ok_or_else(|| CatalogError::NotFound {
        name: name.to_string(),
      })
  }

  #[instrument(name = "catalog_remove", skip(self))]
  async fn remove(&self, name: &str) -> Result<(), CatalogError> {
    validate_name(name)?;

    let _guard = self.write_lock.lock().await;
    let entry = self
      .read_entry(name)
      .await?
      .ok_or_else(|| CatalogError::NotFound {
        name: name.to_string(),
      })?;

    let runs = self.usage.in_use(name);
    if runs > 0 {
      return Err(CatalogError::InUse {
        name: name.to_string(),
        runs,
      });
    }

    fs::remove_file(self.entry_path(name)).await?;
    self.collect_garbage(&entry.artifact_hash).await?;

    info!(artifact_hash = %entry.artifact_hash, "runtime_removed");
    Ok(())
  }

  async fn resolve(&self, name: &str) -> Result<ArtifactHandle, CatalogError> {
    let entry = self.inspect(name).await?;

    if let Some(bytes) = self.cached(&entry.artifact_hash) {
      return Ok(ArtifactHandle::new(entry, bytes));
    }

    let bytes = match self.artifacts.read(&entry.artifact_hash).await {
      Ok(bytes) => bytes,
      // The entry was removed between the lookup and the read.
      Err(ArtifactError::NotFound(_)) => {
        return Err(CatalogError::NotFound {
          name: name.to_string(),
        });
      }
      Err(e) => return Err(e.into()),
    };

    self
      .cache_write()
      .insert(entry.artifact_hash.clone(), bytes.clone());
    debug!(name, artifact_hash = %entry.artifact_hash, "artifact_loaded");
    Ok(ArtifactHandle::new(entry, bytes))
  }

  fn usage(&self) -> &UsageTracker {
    &self.usage
  }
}
