//! Compiled module caching.
//!
//! Modules are compiled once per artifact digest, on the blocking pool. Each
//! invocation gets a fresh instance from the cached compiled module.

use std::collections::HashMap;
use std::sync::RwLock;

use pipewright_catalog::{ArtifactDigest, ArtifactHandle};
use tracing::debug;
use wasmtime::{Engine, Module};

use crate::fault::SandboxFault;

/// Caches compiled wasm modules keyed by content digest.
pub struct ModuleCache {
  cache: RwLock<HashMap<ArtifactDigest, Module>>,
}

impl ModuleCache {
  pub fn new() -> Self {
    Self {
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Get a compiled module from cache, or compile and cache it.
  ///
  /// An artifact that does not compile is reported as a crash.
  pub async fn get_or_compile(
    &self,
    engine: &Engine,
    artifact: &ArtifactHandle,
  ) -> Result<Module, SandboxFault> {
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(module) = cache.get(artifact.digest()) {
        return Ok(module.clone());
      }
    }

    let engine = engine.clone();
    let bytes = artifact.bytes().clone();
    let module = tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
      .await
      .map_err(|e| SandboxFault::crashed(format!("module compilation aborted: {e}")))?
      .map_err(|e| SandboxFault::crashed(format!("failed to compile module: {e}")))?;
    debug!(
      runtime = %artifact.name(),
      artifact_hash = %artifact.digest(),
      "module_compiled"
    );

    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.insert(artifact.digest().clone(), module.clone());
    Ok(module)
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for ModuleCache {
  fn default() -> Self {
    Self::new()
  }
}
