//! Integration tests for the wasmtime sandbox.
//!
//! Modules are written in WAT and talk to the host through the raw
//! `wasi_snapshot_preview1` imports, so no guest toolchain is needed.

use std::time::Duration;

use bytes::Bytes;
use pipewright_catalog::{
  ArtifactDigest, ArtifactHandle, CatalogEntry, FsCatalog, NewEntry, RuntimeCatalog,
  RuntimeSource,
};
use pipewright_sandbox::{
  EnvelopeStatus, InputEnvelope, Limits, Sandbox, SandboxFault, WasmSandbox,
};
use serde_json::json;

/// Imports plus a `$write_all` helper that writes `len` bytes at `ptr` to stdout.
///
/// Scratch layout: iovec at 128, nwritten at 160.
const PRELUDE: &str = r#"
  (import "wasi_snapshot_preview1" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))

  (func $write_all (param $ptr i32) (param $len i32)
    (block $done
      (loop $more
        (br_if $done (i32.eqz (local.get $len)))
        (i32.store (i32.const 128) (local.get $ptr))
        (i32.store (i32.const 132) (local.get $len))
        (br_if $done (call $fd_write (i32.const 1) (i32.const 128) (i32.const 1) (i32.const 160)))
        (br_if $done (i32.eqz (i32.load (i32.const 160))))
        (local.set $ptr (i32.add (local.get $ptr) (i32.load (i32.const 160))))
        (local.set $len (i32.sub (local.get $len) (i32.load (i32.const 160))))
        (br $more))))
"#;

/// Build a module with two pages of memory, the prelude, and `_start`.
fn module(data: &str, start: &str) -> String {
  format!(
    r#"(module
  {PRELUDE}
  (memory (export "memory") 2)
  {data}
  (func (export "_start") {start}))"#
  )
}

/// Escape arbitrary text as a WAT string literal body.
fn wat_string(text: &str) -> String {
  text
    .bytes()
    .map(|b| match b {
      b'"' | b'\\' => format!("\\{}", b as char),
      0x20..=0x7e => (b as char).to_string(),
      _ => format!("\\{b:02x}"),
    })
    .collect()
}

/// A module that prints `text` to stdout and returns.
fn constant_output(text: &str) -> String {
  module(
    &format!(r#"(data (i32.const 1024) "{}")"#, wat_string(text)),
    &format!("(call $write_all (i32.const 1024) (i32.const {}))", text.len()),
  )
}

/// A module that answers `{"status":"ok","output":<stdin>}`.
///
/// Layout: iovec at 0, nread at 8, prefix at 1024, suffix at 1100, input
/// buffer at 2048.
fn echo_module() -> String {
  module(
    r#"(data (i32.const 1024) "{\"status\":\"ok\",\"output\":")
  (data (i32.const 1100) "}")"#,
    r#"(local $len i32) (local $n i32)
    (block $eof
      (loop $read
        (i32.store (i32.const 0) (i32.add (i32.const 2048) (local.get $len)))
        (i32.store (i32.const 4) (i32.sub (i32.const 60000) (local.get $len)))
        (br_if $eof (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
        (local.set $n (i32.load (i32.const 8)))
        (br_if $eof (i32.eqz (local.get $n)))
        (local.set $len (i32.add (local.get $len) (local.get $n)))
        (br $read)))
    (call $write_all (i32.const 1024) (i32.const 24))
    (call $write_all (i32.const 2048) (local.get $len))
    (call $write_all (i32.const 1100) (i32.const 1))"#,
  )
}

fn handle(name: &str, module: impl Into<Bytes>) -> ArtifactHandle {
  let bytes = module.into();
  let entry = CatalogEntry {
    name: name.to_string(),
    source: RuntimeSource::Custom,
    description: String::new(),
    config_schema: serde_json::Value::Null,
    artifact_hash: ArtifactDigest::of(&bytes),
    created_by: None,
    created_at: chrono::Utc::now(),
  };
  ArtifactHandle::new(entry, bytes)
}

fn input() -> InputEnvelope {
  InputEnvelope::new(json!({ "greeting": "hi" }), json!({ "input": { "n": 1 } }))
}

fn quick_limits() -> Limits {
  Limits::default().with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_echo_receives_input_envelope() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("echo", echo_module());

  let envelope = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap();

  assert_eq!(envelope.status, EnvelopeStatus::Ok);
  assert_eq!(
    envelope.output,
    Some(json!({
      "config": { "greeting": "hi" },
      "context": { "input": { "n": 1 } }
    }))
  );
}

#[tokio::test]
async fn test_constant_ok_envelope() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle(
    "const",
    constant_output(r#"{"status":"ok","output":{"rows":[1,2,3]}}"#),
  );

  let envelope = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap();
  assert_eq!(envelope.into_result(), Ok(json!({ "rows": [1, 2, 3] })));
}

#[tokio::test]
async fn test_error_envelope_is_not_a_fault() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle(
    "reject",
    constant_output(r#"{"status":"error","error":"bad request"}"#),
  );

  let envelope = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap();
  assert_eq!(envelope.status, EnvelopeStatus::Error);
  assert_eq!(envelope.into_result(), Err("bad request".to_string()));
}

#[tokio::test]
async fn test_explicit_zero_exit_keeps_output() {
  let sandbox = WasmSandbox::new().unwrap();
  let text = r#"{"status":"ok","output":7}"#;
  let artifact = handle(
    "exit-zero",
    module(
      &format!(r#"(data (i32.const 1024) "{}")"#, wat_string(text)),
      &format!(
        "(call $write_all (i32.const 1024) (i32.const {})) (call $proc_exit (i32.const 0))",
        text.len()
      ),
    ),
  );

  let envelope = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap();
  assert_eq!(envelope.output, Some(json!(7)));
}

#[tokio::test]
async fn test_garbage_output_is_malformed() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("garbage", constant_output("definitely not json"));

  let fault = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap_err();
  assert!(matches!(fault, SandboxFault::MalformedOutput { .. }), "{fault:?}");
}

#[tokio::test]
async fn test_silent_module_is_malformed() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("silent", module("", "(nop)"));

  let fault = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap_err();
  assert_eq!(fault.kind(), "malformed_output");
}

#[tokio::test]
async fn test_trap_is_crash() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("trap", module("", "(unreachable)"));

  match sandbox.run(&artifact, &input(), &quick_limits()).await {
    Err(SandboxFault::Crashed { exit_code, .. }) => assert_eq!(exit_code, None),
    other => panic!("expected Crashed, got {other:?}"),
  }
}

#[tokio::test]
async fn test_nonzero_exit_is_crash_even_with_envelope() {
  let sandbox = WasmSandbox::new().unwrap();
  let text = r#"{"status":"ok","output":1}"#;
  let artifact = handle(
    "exit-three",
    module(
      &format!(r#"(data (i32.const 1024) "{}")"#, wat_string(text)),
      &format!(
        "(call $write_all (i32.const 1024) (i32.const {})) (call $proc_exit (i32.const 3))",
        text.len()
      ),
    ),
  );

  match sandbox.run(&artifact, &input(), &quick_limits()).await {
    Err(SandboxFault::Crashed { exit_code, .. }) => assert_eq!(exit_code, Some(3)),
    other => panic!("expected Crashed, got {other:?}"),
  }
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("spin", module("", "(loop $spin (br $spin))"));
  let limits = Limits::default().with_timeout(Duration::from_millis(200));

  let started = std::time::Instant::now();
  let fault = sandbox.run(&artifact, &input(), &limits).await.unwrap_err();

  assert_eq!(
    fault,
    SandboxFault::Timeout {
      limit: Duration::from_millis(200)
    }
  );
  assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_memory_growth_past_cap() {
  let sandbox = WasmSandbox::new().unwrap();
  // Growth fails (returns -1) under the limiter; trap afterwards.
  let artifact = handle(
    "hog",
    module("", "(drop (memory.grow (i32.const 1000))) (unreachable)"),
  );
  let limits = quick_limits().with_memory_cap(1024 * 1024);

  let fault = sandbox.run(&artifact, &input(), &limits).await.unwrap_err();
  assert!(matches!(fault, SandboxFault::ResourceExceeded { .. }), "{fault:?}");
}

#[tokio::test]
async fn test_initial_memory_past_cap() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle(
    "big",
    r#"(module (memory (export "memory") 100) (func (export "_start")))"#,
  );
  let limits = quick_limits().with_memory_cap(1024 * 1024);

  let fault = sandbox.run(&artifact, &input(), &limits).await.unwrap_err();
  assert_eq!(fault.kind(), "resource_exceeded");
}

#[tokio::test]
async fn test_stdout_overflow() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle(
    "chatty",
    module(
      r#"(data (i32.const 1024) "xxxxxxxx")"#,
      r#"(local $i i32)
    (loop $again
      (call $write_all (i32.const 1024) (i32.const 8))
      (local.set $i (i32.add (local.get $i) (i32.const 1)))
      (br_if $again (i32.lt_u (local.get $i) (i32.const 10))))"#,
    ),
  );
  let mut limits = quick_limits();
  limits.stdout_cap_bytes = 16;

  let fault = sandbox.run(&artifact, &input(), &limits).await.unwrap_err();
  assert!(matches!(fault, SandboxFault::ResourceExceeded { .. }), "{fault:?}");
}

#[tokio::test]
async fn test_output_exactly_at_cap() {
  let sandbox = WasmSandbox::new().unwrap();
  let text = r#"{"status":"ok","output":1}"#;
  let artifact = handle("snug", constant_output(text));

  let mut limits = quick_limits();
  limits.stdout_cap_bytes = text.len();
  let envelope = sandbox.run(&artifact, &input(), &limits).await.unwrap();
  assert_eq!(envelope.into_result(), Ok(json!(1)));

  limits.stdout_cap_bytes = text.len() - 1;
  let fault = sandbox.run(&artifact, &input(), &limits).await.unwrap_err();
  assert!(matches!(fault, SandboxFault::ResourceExceeded { .. }), "{fault:?}");
}

#[tokio::test]
async fn test_missing_entry_point_is_crash() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("library", r#"(module (func (export "helper")))"#);

  let fault = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap_err();
  assert_eq!(fault.kind(), "crashed");
}

#[tokio::test]
async fn test_invalid_module_is_crash() {
  let sandbox = WasmSandbox::new().unwrap();
  let artifact = handle("junk", Bytes::from_static(b"\0asm\x63\x00\x00\x00"));

  let fault = sandbox
    .run(&artifact, &input(), &quick_limits())
    .await
    .unwrap_err();
  assert_eq!(fault.kind(), "crashed");
  assert!(sandbox.modules().is_empty());
}

#[tokio::test]
async fn test_compiled_modules_are_cached_by_digest() {
  let sandbox = WasmSandbox::new().unwrap();
  let first = handle("echo", echo_module());
  let alias = handle("echo-alias", echo_module());

  sandbox.run(&first, &input(), &quick_limits()).await.unwrap();
  sandbox.run(&alias, &input(), &quick_limits()).await.unwrap();

  assert_eq!(sandbox.modules().len(), 1);
}

#[tokio::test]
async fn test_concurrent_first_runs_compile_off_the_runtime() {
  let sandbox = WasmSandbox::new().unwrap();
  let first = handle("echo", echo_module());
  let other = handle("const", constant_output(r#"{"status":"ok","output":2}"#));

  let limits = quick_limits();
  let (input_a, input_b) = (input(), input());
  let (a, b) = tokio::join!(
    sandbox.run(&first, &input_a, &limits),
    sandbox.run(&other, &input_b, &limits)
  );

  assert!(a.is_ok(), "{a:?}");
  assert_eq!(b.unwrap().into_result(), Ok(json!(2)));
  assert_eq!(sandbox.modules().len(), 2);
}

#[tokio::test]
async fn test_handle_survives_catalog_overwrite() {
  let dir = tempfile::tempdir().unwrap();
  let catalog = FsCatalog::new(dir.path());
  let sandbox = WasmSandbox::new().unwrap();

  catalog
    .register(
      NewEntry::custom("versioned"),
      Bytes::from(constant_output(r#"{"status":"ok","output":"v1"}"#)),
      false,
    )
    .await
    .unwrap();
  let held = catalog.resolve("versioned").await.unwrap();

  catalog
    .register(
      NewEntry::custom("versioned"),
      Bytes::from(constant_output(r#"{"status":"ok","output":"v2"}"#)),
      true,
    )
    .await
    .unwrap();

  let old = sandbox.run(&held, &input(), &quick_limits()).await.unwrap();
  assert_eq!(old.output, Some(json!("v1")));

  let fresh = catalog.resolve("versioned").await.unwrap();
  let new = sandbox.run(&fresh, &input(), &quick_limits()).await.unwrap();
  assert_eq!(new.output, Some(json!("v2")));
}
