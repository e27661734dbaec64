//! Per-run context store.
//!
//! The store is a write-once map from task id to that task's output, plus the
//! reserved `input` entry holding the run's invocation payload. Tasks never
//! see the store itself: each dispatch gets an immutable [`ContextSnapshot`].

use std::sync::{Arc, RwLock};

use pipewright_workflow::INPUT_KEY;
use pipewright_workflow::references::path_segments;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ContextError;

/// Append-only mapping from task id to output value.
#[derive(Debug)]
pub struct ContextStore {
  entries: RwLock<Map<String, Value>>,
}

impl ContextStore {
  /// Create a store seeded with the run's input payload.
  pub fn new(input: Value) -> Self {
    let mut entries = Map::new();
    entries.insert(INPUT_KEY.to_string(), input);
    Self {
      entries: RwLock::new(entries),
    }
  }

  /// Record a task's output. Each key can be written exactly once.
  pub fn insert(&self, task_id: &str, value: Value) -> Result<(), ContextError> {
    let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
    if entries.contains_key(task_id) {
      return Err(ContextError::DuplicateKey {
        key: task_id.to_string(),
      });
    }
    entries.insert(task_id.to_string(), value);
    Ok(())
  }

  /// An immutable view of every entry written so far.
  pub fn snapshot(&self) -> ContextSnapshot {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    ContextSnapshot(Arc::new(entries.clone()))
  }

  /// Resolve a dot path such as `fetch.body.items.0` against the live store.
  pub fn resolve_path(&self, path: &str) -> Result<Value, ContextError> {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    walk(&entries, path).cloned()
  }

  pub fn contains(&self, key: &str) -> bool {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    entries.contains_key(key)
  }

  /// Number of entries, including `input`.
  pub fn len(&self) -> usize {
    let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
    entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A point-in-time copy of the context, cheap to clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextSnapshot(Arc<Map<String, Value>>);

impl ContextSnapshot {
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn resolve_path(&self, path: &str) -> Result<&Value, ContextError> {
    walk(&self.0, path)
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }

  /// The snapshot as a JSON object, for the input envelope.
  pub fn to_value(&self) -> Value {
    Value::Object(self.0.as_ref().clone())
  }
}

fn walk<'a>(entries: &'a Map<String, Value>, path: &str) -> Result<&'a Value, ContextError> {
  let not_found = || ContextError::PathNotFound {
    path: path.to_string(),
  };

  let mut segments = path_segments(path).into_iter();
  let root = segments.next().filter(|s| !s.is_empty()).ok_or_else(not_found)?;
  let mut current = entries.get(root).ok_or_else(not_found)?;

  for segment in segments {
    current = match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    }
    .ok_or_else(not_found)?;
  }

  Ok(current)
}
