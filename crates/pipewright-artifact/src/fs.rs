use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{ArtifactDigest, ArtifactError, ArtifactStore, ByteStream};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem-based artifact store.
///
/// Artifacts are stored as files named by their digest:
/// ```text
/// {base_path}/
/// ├── sha256/
/// │   └── 9f86d081884c7d65...
/// └── tmp/          (in-flight writes, renamed into place when complete)
/// ```
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn digest_to_path(&self, digest: &ArtifactDigest) -> PathBuf {
    self.base_path.join("sha256").join(digest.hex())
  }

  fn temp_path(&self) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    self
      .base_path
      .join("tmp")
      .join(format!("{}-{}.part", std::process::id(), n))
  }

  fn not_found(digest: &ArtifactDigest, e: std::io::Error) -> ArtifactError {
    if e.kind() == std::io::ErrorKind::NotFound {
      ArtifactError::NotFound(digest.clone())
    } else {
      ArtifactError::Io(e)
    }
  }
}

#[async_trait]
impl ArtifactStore for FsStore {
  async fn get(&self, digest: &ArtifactDigest) -> Result<ByteStream, ArtifactError> {
    let path = self.digest_to_path(digest);
    let file = File::open(&path)
      .await
      .map_err(|e| Self::not_found(digest, e))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(ArtifactError::Io));
    Ok(Box::pin(stream))
  }

  async fn put(&self, data: ByteStream) -> Result<ArtifactDigest, ArtifactError> {
    let temp = self.temp_path();
    if let Some(parent) = temp.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut hasher = Sha256::new();
    let mut file = File::create(&temp).await?;
    let mut stream = data;

    let written: Result<(), ArtifactError> = async {
      while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        hasher.update(&bytes);
        file.write_all(&bytes).await?;
      }
      file.flush().await?;
      file.sync_all().await?;
      Ok(())
    }
    .await;
    drop(file);

    if let Err(e) = written {
      let _ = fs::remove_file(&temp).await;
      return Err(e);
    }

    let digest = ArtifactDigest::from_hasher(hasher);
    let target = self.digest_to_path(&digest);

    if fs::try_exists(&target).await? {
      fs::remove_file(&temp).await?;
      return Ok(digest);
    }

    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::rename(&temp, &target).await?;
    Ok(digest)
  }

  async fn contains(&self, digest: &ArtifactDigest) -> Result<bool, ArtifactError> {
    Ok(fs::try_exists(self.digest_to_path(digest)).await?)
  }

  async fn delete(&self, digest: &ArtifactDigest) -> Result<(), ArtifactError> {
    let path = self.digest_to_path(digest);
    fs::remove_file(&path)
      .await
      .map_err(|e| Self::not_found(digest, e))
  }
}
