//! Shared harness for scheduler tests.
//!
//! Runtimes are registered in a real on-disk catalog, but their "artifact" is
//! a JSON script that [`ScriptedSandbox`] interprets instead of executing
//! wasm. That keeps the tests fast while exercising the full resolve path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pipewright_catalog::{ArtifactHandle, FsCatalog, NewEntry, RuntimeCatalog};
use pipewright_runtime::{RunOutcome, Scheduler, SchedulerConfig};
use pipewright_sandbox::{InputEnvelope, Limits, OutputEnvelope, Sandbox, SandboxFault};
use pipewright_workflow::parse;
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// What a scripted runtime does when invoked.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Script {
  /// Envelope to print. Defaults to echoing the call (see [`ScriptedSandbox`]).
  pub reply: Option<Value>,
  /// Fault to raise instead of replying.
  pub fault: Option<String>,
  /// Time spent "running" before answering.
  pub delay_ms: u64,
  /// Answer with an error envelope this many times before succeeding.
  pub fail_times: usize,
}

/// One observed invocation.
#[derive(Debug, Clone)]
pub struct Call {
  pub runtime: String,
  pub config: Value,
  /// Context keys visible at dispatch, sorted.
  pub seen: Vec<String>,
}

/// A [`Sandbox`] that interprets JSON scripts.
///
/// Without a `reply`, a runtime answers `ok` with
/// `{ "runtime": <name>, "config": <resolved config>, "seen": [<context keys>] }`.
#[derive(Default)]
pub struct ScriptedSandbox {
  running: AtomicUsize,
  max_running: AtomicUsize,
  calls: Mutex<Vec<Call>>,
  failures: Mutex<HashMap<String, usize>>,
}

impl ScriptedSandbox {
  pub fn max_running(&self) -> usize {
    self.max_running.load(Ordering::SeqCst)
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, runtime: &str) -> usize {
    self.calls().iter().filter(|c| c.runtime == runtime).count()
  }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
  async fn run(
    &self,
    artifact: &ArtifactHandle,
    input: &InputEnvelope,
    limits: &Limits,
  ) -> Result<OutputEnvelope, SandboxFault> {
    let script: Script = serde_json::from_slice(artifact.bytes())
      .map_err(|e| SandboxFault::crashed(format!("bad script: {e}")))?;

    let mut seen: Vec<String> = input
      .context
      .as_object()
      .map(|m| m.keys().cloned().collect())
      .unwrap_or_default();
    seen.sort();

    self.calls.lock().unwrap().push(Call {
      runtime: artifact.name().to_string(),
      config: input.config.clone(),
      seen: seen.clone(),
    });

    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);
    let _guard = RunningGuard(&self.running);

    if script.delay_ms > 0 {
      let delay = Duration::from_millis(script.delay_ms);
      if delay > limits.timeout {
        tokio::time::sleep(limits.timeout).await;
        return Err(SandboxFault::Timeout {
          limit: limits.timeout,
        });
      }
      tokio::time::sleep(delay).await;
    }

    if let Some(kind) = script.fault.as_deref() {
      return Err(match kind {
        "timeout" => SandboxFault::Timeout {
          limit: limits.timeout,
        },
        "resource_exceeded" => SandboxFault::resource_exceeded("scripted"),
        "malformed_output" => SandboxFault::malformed("scripted"),
        _ => SandboxFault::Crashed {
          message: "scripted crash".to_string(),
          exit_code: Some(1),
        },
      });
    }

    if script.fail_times > 0 {
      let mut failures = self.failures.lock().unwrap();
      let count = failures.entry(artifact.name().to_string()).or_default();
      if *count < script.fail_times {
        *count += 1;
        return Ok(OutputEnvelope::error(format!("scripted failure {count}")));
      }
    }

    match script.reply {
      Some(reply) => serde_json::from_value(reply)
        .map_err(|e| SandboxFault::malformed(e.to_string())),
      None => Ok(OutputEnvelope::ok(json!({
        "runtime": artifact.name(),
        "config": input.config,
        "seen": seen,
      }))),
    }
  }
}

/// A catalog in a temp dir plus the scripted sandbox.
pub struct Harness {
  pub dir: TempDir,
  pub catalog: Arc<FsCatalog>,
  pub sandbox: Arc<ScriptedSandbox>,
}

impl Harness {
  pub fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(FsCatalog::new(dir.path().join("catalog")));
    Self {
      dir,
      catalog,
      sandbox: Arc::new(ScriptedSandbox::default()),
    }
  }

  /// Register `name` with the given script.
  pub async fn runtime(&self, name: &str, script: Value) {
    self
      .catalog
      .register(
        NewEntry::custom(name),
        Bytes::from(script.to_string()),
        true,
      )
      .await
      .unwrap();
  }

  /// Register `name` with a schema on its config.
  pub async fn runtime_with_schema(&self, name: &str, script: Value, schema: Value) {
    self
      .catalog
      .register(
        NewEntry::custom(name).with_config_schema(schema),
        Bytes::from(script.to_string()),
        true,
      )
      .await
      .unwrap();
  }

  pub fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
    Scheduler::new(self.catalog.clone(), self.sandbox.clone(), config)
  }

  /// Parse `definition` and run it with default config.
  pub async fn run(&self, definition: Value, input: Value) -> RunOutcome {
    self
      .run_with(definition, input, SchedulerConfig::default())
      .await
  }

  pub async fn run_with(
    &self,
    definition: Value,
    input: Value,
    config: SchedulerConfig,
  ) -> RunOutcome {
    let workflow = parse(&definition.to_string()).expect("valid workflow");
    self
      .scheduler(config)
      .run(&workflow, input, CancellationToken::new())
      .await
      .unwrap()
  }
}

/// Default script: echo the call.
pub fn echo() -> Value {
  json!({})
}

pub fn ok(output: Value) -> Value {
  json!({ "reply": { "status": "ok", "output": output } })
}

pub fn error(message: &str) -> Value {
  json!({ "reply": { "status": "error", "error": message } })
}

pub fn slow(delay_ms: u64) -> Value {
  json!({ "delay_ms": delay_ms })
}
