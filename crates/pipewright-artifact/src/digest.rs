use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ArtifactError;

const PREFIX: &str = "sha256:";

/// Content-addressed identity of an artifact, written `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactDigest(String);

impl ArtifactDigest {
  /// Compute the digest of a byte slice.
  pub fn of(bytes: &[u8]) -> Self {
    Self::from_hasher(Sha256::new_with_prefix(bytes))
  }

  pub(crate) fn from_hasher(hasher: Sha256) -> Self {
    Self(format!("{PREFIX}{:x}", hasher.finalize()))
  }

  /// The lowercase hex part, without the algorithm prefix.
  pub fn hex(&self) -> &str {
    &self.0[PREFIX.len()..]
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl FromStr for ArtifactDigest {
  type Err = ArtifactError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let hex_part = s
      .strip_prefix(PREFIX)
      .ok_or_else(|| ArtifactError::InvalidDigest(s.to_string()))?;
    let valid = hex_part.len() == 64
      && hex_part
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if !valid {
      return Err(ArtifactError::InvalidDigest(s.to_string()));
    }
    Ok(Self(s.to_string()))
  }
}

impl TryFrom<String> for ArtifactDigest {
  type Error = ArtifactError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ArtifactDigest> for String {
  fn from(digest: ArtifactDigest) -> Self {
    digest.0
  }
}

impl fmt::Display for ArtifactDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
