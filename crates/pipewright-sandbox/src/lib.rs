//! Pipewright Sandbox
//!
//! This crate runs a single runtime artifact in isolation. The host and the
//! module talk through a fixed envelope protocol: the [`InputEnvelope`] is
//! written to the module's stdin, and the module answers with an
//! [`OutputEnvelope`] on stdout.
//!
//! A [`SandboxFault`] means the module itself misbehaved (timed out, trapped,
//! blew a resource limit, or wrote garbage). An `error` envelope means the
//! module ran fine and reported a business-level failure. Callers keep the two
//! apart for observability.
//!
//! [`WasmSandbox`] is the production implementation: WASI preview 1 modules on
//! wasmtime, with epoch-based timeouts and a memory limiter per invocation.

mod cache;
mod engine;
mod envelope;
mod fault;
mod limits;
mod sandbox;
mod state;
mod wasm;

pub use cache::ModuleCache;
pub use engine::WasmSandboxConfig;
pub use envelope::{EnvelopeStatus, InputEnvelope, OutputEnvelope};
pub use fault::{SandboxError, SandboxFault};
pub use limits::Limits;
pub use sandbox::Sandbox;
pub use wasm::WasmSandbox;
