use std::time::Duration;

/// Per-invocation resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
  /// Wall-clock budget for one invocation.
  pub timeout: Duration,
  /// Maximum linear memory a module may grow to.
  pub memory_cap_bytes: u64,
  /// Maximum bytes captured from stdout; writing more is a resource fault.
  pub stdout_cap_bytes: usize,
  /// Maximum bytes of stderr kept for diagnostics.
  pub stderr_cap_bytes: usize,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(30),
      memory_cap_bytes: 64 * 1024 * 1024,
      stdout_cap_bytes: 1024 * 1024,
      stderr_cap_bytes: 256 * 1024,
    }
  }
}

impl Limits {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_memory_cap(mut self, bytes: u64) -> Self {
    self.memory_cap_bytes = bytes;
    self
  }
}
