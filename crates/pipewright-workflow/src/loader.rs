//! Loading every workflow file in a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pipewright_config::DocumentFormat;
use tracing::{debug, info, warn};

use crate::error::DefinitionError;
use crate::workflow::{WorkflowGraph, load_file};

/// Outcome of loading one file.
#[derive(Debug)]
pub struct LoadedFile {
  pub path: PathBuf,
  pub result: Result<WorkflowGraph, DefinitionError>,
}

/// Load every `.json` and `.toml` workflow in `dir`, in file name order.
///
/// A file that fails to parse or validate is reported in its own entry and
/// does not stop the others. When two files define the same workflow name,
/// the later one is rejected.
pub fn load_dir(dir: &Path) -> Result<Vec<LoadedFile>, DefinitionError> {
  let read_dir = |source| DefinitionError::ReadDir {
    path: dir.to_path_buf(),
    source,
  };

  let mut paths = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(read_dir)? {
    let path = entry.map_err(read_dir)?.path();
    if path.is_file() && DocumentFormat::from_path(&path).is_ok() {
      paths.push(path);
    } else {
      debug!(path = %path.display(), "skipping non-workflow entry");
    }
  }
  paths.sort();

  let mut seen: HashMap<String, PathBuf> = HashMap::new();
  let mut loaded = Vec::with_capacity(paths.len());
  for path in paths {
    let result = load_file(&path).and_then(|workflow| {
      if let Some(first) = seen.get(workflow.name()) {
        return Err(DefinitionError::DuplicateWorkflow {
          name: workflow.name().to_string(),
          first: first.clone(),
        });
      }
      seen.insert(workflow.name().to_string(), path.clone());
      Ok(workflow)
    });

    if let Err(e) = &result {
      warn!(path = %path.display(), error = %e, "workflow_rejected");
    }
    loaded.push(LoadedFile { path, result });
  }

  info!(
    dir = %dir.display(),
    valid = seen.len(),
    rejected = loaded.len() - seen.len(),
    "workflows_loaded"
  );
  Ok(loaded)
}
