use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Counts how many live runs reference each runtime name.
///
/// This backs the soft `InUse` check on removal. It is advisory: a run that
/// already resolved its artifacts keeps working even if the entry goes away.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
  counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl UsageTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mark every name as in use until the returned guard is dropped.
  pub fn acquire<I, S>(&self, names: I) -> UsageGuard
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();

    let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
    for name in &names {
      *counts.entry(name.clone()).or_default() += 1;
    }

    UsageGuard {
      tracker: self.clone(),
      names,
    }
  }

  /// Number of live runs referencing `name`.
  pub fn in_use(&self, name: &str) -> usize {
    let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
    counts.get(name).copied().unwrap_or(0)
  }

  fn release(&self, names: &[String]) {
    let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
    for name in names {
      if let Some(count) = counts.get_mut(name) {
        *count = count.saturating_sub(1);
        if *count == 0 {
          counts.remove(name);
        }
      }
    }
  }
}

/// Releases its names from the [`UsageTracker`] on drop.
#[derive(Debug)]
pub struct UsageGuard {
  tracker: UsageTracker,
  names: Vec<String>,
}

impl UsageGuard {
  pub fn names(&self) -> &[String] {
    &self.names
  }
}

impl Drop for UsageGuard {
  fn drop(&mut self) {
    self.tracker.release(&self.names);
  }
}
