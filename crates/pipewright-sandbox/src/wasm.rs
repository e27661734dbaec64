use std::time::{Duration, Instant};

use async_trait::async_trait;
use pipewright_catalog::ArtifactHandle;
use tracing::{debug, instrument};
use wasmtime::{Engine, Linker, Trap};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};

use crate::cache::ModuleCache;
use crate::engine::{EpochTicker, WasmSandboxConfig, create_engine, epoch_ticks};
use crate::envelope::{InputEnvelope, OutputEnvelope};
use crate::fault::{SandboxError, SandboxFault};
use crate::limits::Limits;
use crate::sandbox::Sandbox;
use crate::state::{SandboxState, create_store};

/// Extra wall-clock time granted past the epoch deadline before giving up on
/// an invocation stuck inside a host call.
const BACKSTOP_GRACE: Duration = Duration::from_secs(1);

/// Bytes of stderr quoted in crash messages.
const STDERR_EXCERPT: usize = 512;

/// Executes WASI preview 1 command modules on wasmtime.
///
/// Modules get stdin/stdout/stderr only: no preopened directories,
/// environment variables, or sockets.
pub struct WasmSandbox {
  engine: Engine,
  modules: ModuleCache,
  config: WasmSandboxConfig,
  _ticker: EpochTicker,
}

impl WasmSandbox {
  /// Create a sandbox with the default configuration.
  pub fn new() -> Result<Self, SandboxError> {
    Self::with_config(WasmSandboxConfig::default())
  }

  pub fn with_config(config: WasmSandboxConfig) -> Result<Self, SandboxError> {
    let engine = create_engine()?;
    let ticker = EpochTicker::start(engine.clone(), config.epoch_tick)?;

    Ok(Self {
      engine,
      modules: ModuleCache::new(),
      config,
      _ticker: ticker,
    })
  }

  /// Compiled-module cache, keyed by artifact digest.
  pub fn modules(&self) -> &ModuleCache {
    &self.modules
  }
}

#[async_trait]
impl Sandbox for WasmSandbox {
  #[instrument(
    name = "sandbox_run",
    skip(self, artifact, input, limits),
    fields(
      runtime = %artifact.name(),
      artifact_hash = %artifact.digest(),
    )
  )]
  async fn run(
    &self,
    artifact: &ArtifactHandle,
    input: &InputEnvelope,
    limits: &Limits,
  ) -> Result<OutputEnvelope, SandboxFault> {
    let started = Instant::now();
    let module = self.modules.get_or_compile(&self.engine, artifact).await?;

    let stdin = serde_json::to_vec(input)
      .map_err(|e| SandboxFault::crashed(format!("failed to encode input envelope: {e}")))?;
    // One spare byte tells output that fills the cap apart from output past it.
    let stdout = MemoryOutputPipe::new(limits.stdout_cap_bytes.saturating_add(1));
    let stderr = MemoryOutputPipe::new(limits.stderr_cap_bytes);

    let wasi = WasiCtxBuilder::new()
      .stdin(MemoryInputPipe::new(stdin))
      .stdout(stdout.clone())
      .stderr(stderr.clone())
      .build_p1();

    let state = SandboxState::new(wasi, limits.memory_cap_bytes);
    let mut store = create_store(
      &self.engine,
      state,
      epoch_ticks(limits.timeout, self.config.epoch_tick),
    );

    let mut linker: Linker<SandboxState> = Linker::new(&self.engine);
    wasmtime_wasi::p1::add_to_linker_async(&mut linker, |state| &mut state.wasi)
      .map_err(|e| SandboxFault::crashed(format!("failed to link WASI imports: {e}")))?;

    let call = async {
      let instance = linker.instantiate_async(&mut store, &module).await?;
      let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
      start.call_async(&mut store, ()).await
    };
    let outcome = tokio::time::timeout(limits.timeout + BACKSTOP_GRACE, call).await;

    let stdout = stdout.contents();
    let stdout_full = stdout.len() > limits.stdout_cap_bytes;

    let exit_code = match outcome {
      Err(_) => {
        return Err(SandboxFault::Timeout {
          limit: limits.timeout,
        });
      }
      Ok(Ok(())) => 0,
      Ok(Err(e)) => classify(e, store.data(), stdout_full, limits)?,
    };

    debug!(
      exit_code,
      elapsed_ms = started.elapsed().as_millis() as u64,
      stdout_bytes = stdout.len(),
      "module_exited"
    );

    if stdout_full {
      return Err(stdout_exceeded(limits));
    }
    if exit_code != 0 {
      let stderr = stderr.contents();
      let excerpt = String::from_utf8_lossy(&stderr[..stderr.len().min(STDERR_EXCERPT)]);
      return Err(SandboxFault::Crashed {
        message: format!("module exited with code {exit_code}: {}", excerpt.trim()),
        exit_code: Some(exit_code),
      });
    }

    OutputEnvelope::parse(&stdout)
  }
}

/// Turn a wasmtime error into an exit code (for `proc_exit`) or a fault.
fn classify(
  err: wasmtime::Error,
  state: &SandboxState,
  stdout_full: bool,
  limits: &Limits,
) -> Result<i32, SandboxFault> {
  if let Some(exit) = err.downcast_ref::<wasmtime_wasi::I32Exit>() {
    return Ok(exit.0);
  }
  if state.limiter.exceeded() {
    return Err(SandboxFault::resource_exceeded(format!(
      "memory limit of {} bytes exceeded",
      limits.memory_cap_bytes
    )));
  }
  if stdout_full {
    return Err(stdout_exceeded(limits));
  }
  if let Some(Trap::Interrupt) = err.downcast_ref::<Trap>() {
    return Err(SandboxFault::Timeout {
      limit: limits.timeout,
    });
  }

  Err(SandboxFault::crashed(format!("{err:#}")))
}

fn stdout_exceeded(limits: &Limits) -> SandboxFault {
  SandboxFault::resource_exceeded(format!(
    "output limit of {} bytes exceeded",
    limits.stdout_cap_bytes
  ))
}
