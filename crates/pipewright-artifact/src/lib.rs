//! Pipewright Artifact
//!
//! This crate provides content-addressed storage for executable artifacts.
//! An artifact is an opaque blob (a compiled module) identified only by the
//! SHA-256 of its bytes, so storing the same bytes twice is a no-op and a
//! digest always names exactly one content.
//!
//! The [`ArtifactStore`] trait is the backend seam; [`FsStore`] keeps blobs on
//! the local filesystem. Reads and writes stream so large modules never have
//! to be buffered twice.

mod digest;
mod fs;

pub use digest::ArtifactDigest;
pub use fs::FsStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for artifact data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ArtifactError>> + Send>>;

/// Error type for artifact storage operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
  /// The requested artifact was not found.
  #[error("artifact not found: {0}")]
  NotFound(ArtifactDigest),

  /// A string was not a valid `sha256:<hex>` digest.
  #[error("invalid artifact digest: {0}")]
  InvalidDigest(String),

  /// Stored bytes no longer hash to the digest they are filed under.
  #[error("artifact digest mismatch: expected {expected}, got {actual}")]
  DigestMismatch {
    expected: ArtifactDigest,
    actual: ArtifactDigest,
  },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Content-addressed artifact storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
  /// Retrieve an artifact as a stream of bytes.
  async fn get(&self, digest: &ArtifactDigest) -> Result<ByteStream, ArtifactError>;

  /// Store an artifact and return its digest.
  ///
  /// Storing content that is already present is a no-op.
  async fn put(&self, data: ByteStream) -> Result<ArtifactDigest, ArtifactError>;

  /// Whether an artifact with this digest is stored.
  async fn contains(&self, digest: &ArtifactDigest) -> Result<bool, ArtifactError>;

  /// Delete an artifact.
  async fn delete(&self, digest: &ArtifactDigest) -> Result<(), ArtifactError>;

  /// Read a whole artifact into memory, verifying its digest.
  async fn read(&self, digest: &ArtifactDigest) -> Result<Bytes, ArtifactError> {
    let mut stream = self.get(digest).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
      buf.extend_from_slice(&chunk?);
    }

    let bytes = buf.freeze();
    let actual = ArtifactDigest::of(&bytes);
    if &actual != digest {
      return Err(ArtifactError::DigestMismatch {
        expected: digest.clone(),
        actual,
      });
    }
    Ok(bytes)
  }
}

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn stream_bytes(bytes: impl Into<Bytes>) -> ByteStream {
  let bytes = bytes.into();
  Box::pin(futures::stream::once(async move { Ok(bytes) }))
}
