use wasmtime::{Engine, ResourceLimiter, Store, Trap, UpdateDeadline};
use wasmtime_wasi::p1::WasiP1Ctx;

/// Upper bound on table elements; modules do not need more.
const MAX_TABLE_ELEMENTS: usize = 100_000;

/// Host state stored in the wasmtime Store.
///
/// Each invocation gets a fresh SandboxState, so nothing leaks between runs.
pub(crate) struct SandboxState {
  pub wasi: WasiP1Ctx,
  pub limiter: MemoryLimiter,
}

impl SandboxState {
  pub fn new(wasi: WasiP1Ctx, memory_cap_bytes: u64) -> Self {
    Self {
      wasi,
      limiter: MemoryLimiter::new(memory_cap_bytes),
    }
  }
}

/// Refuses memory growth past the cap and remembers that it did.
pub(crate) struct MemoryLimiter {
  memory_cap: usize,
  exceeded: bool,
}

impl MemoryLimiter {
  fn new(memory_cap_bytes: u64) -> Self {
    Self {
      memory_cap: usize::try_from(memory_cap_bytes).unwrap_or(usize::MAX),
      exceeded: false,
    }
  }

  pub fn exceeded(&self) -> bool {
    self.exceeded
  }
}

impl ResourceLimiter for MemoryLimiter {
  fn memory_growing(
    &mut self,
    _current: usize,
    desired: usize,
    _maximum: Option<usize>,
  ) -> wasmtime::Result<bool> {
    if desired > self.memory_cap {
      self.exceeded = true;
      return Ok(false);
    }
    Ok(true)
  }

  fn table_growing(
    &mut self,
    _current: usize,
    desired: usize,
    _maximum: Option<usize>,
  ) -> wasmtime::Result<bool> {
    Ok(desired <= MAX_TABLE_ELEMENTS)
  }
}

/// Create a Store for one invocation.
///
/// The store yields back to the async executor on every epoch tick, which is
/// where a dropped (cancelled) invocation stops. After `deadline_ticks` ticks
/// the guest is interrupted with [`Trap::Interrupt`].
pub(crate) fn create_store(
  engine: &Engine,
  state: SandboxState,
  deadline_ticks: u64,
) -> Store<SandboxState> {
  let mut store = Store::new(engine, state);
  store.limiter(|state| &mut state.limiter);

  let mut remaining = deadline_ticks;
  store.epoch_deadline_callback(move |_ctx| {
    if remaining == 0 {
      return Err(Trap::Interrupt.into());
    }
    remaining -= 1;
    Ok(UpdateDeadline::Yield(1))
  });
  store.set_epoch_deadline(1);

  store
}
