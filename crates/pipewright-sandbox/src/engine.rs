use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use wasmtime::{Config, Engine};

use crate::fault::SandboxError;

/// Configuration for [`WasmSandbox`](crate::WasmSandbox).
#[derive(Debug, Clone)]
pub struct WasmSandboxConfig {
  /// Interval between epoch increments. Timeouts are enforced, and
  /// cancellation is observed, at this granularity.
  pub epoch_tick: Duration,
}

impl Default for WasmSandboxConfig {
  fn default() -> Self {
    Self {
      epoch_tick: Duration::from_millis(10),
    }
  }
}

/// Create the wasmtime Engine shared by every invocation.
///
/// The Engine is expensive to create and should live as long as the sandbox.
pub(crate) fn create_engine() -> Result<Engine, SandboxError> {
  let mut config = Config::new();
  config.async_support(true);
  config.epoch_interruption(true);

  Engine::new(&config).map_err(SandboxError::Engine)
}

/// Background thread that advances the engine epoch until dropped.
pub(crate) struct EpochTicker {
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
  pub(crate) fn start(engine: Engine, tick: Duration) -> Result<Self, SandboxError> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();

    let handle = std::thread::Builder::new()
      .name("pipewright-epoch".to_string())
      .spawn(move || {
        while !flag.load(Ordering::Relaxed) {
          std::thread::sleep(tick);
          engine.increment_epoch();
        }
      })?;

    Ok(Self {
      stop,
      handle: Some(handle),
    })
  }
}

impl Drop for EpochTicker {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// Number of epoch ticks covering `timeout`, rounded up.
pub(crate) fn epoch_ticks(timeout: Duration, tick: Duration) -> u64 {
  let tick_nanos = tick.as_nanos().max(1);
  let ticks = timeout.as_nanos().div_ceil(tick_nanos).max(1);
  u64::try_from(ticks).unwrap_or(u64::MAX)
}
