//! The fixed message shapes exchanged with a sandboxed module.
//!
//! Input (stdin):
//! ```json
//! { "config": { ... }, "context": { "input": { ... }, "<task_id>": { ... } } }
//! ```
//!
//! Output (stdout):
//! ```json
//! { "status": "ok", "output": { ... } }
//! { "status": "error", "error": "human-readable message" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fault::SandboxFault;

/// Message written to the module's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEnvelope {
  /// The task's configuration with context references already substituted.
  pub config: Value,
  /// Snapshot of the run context at dispatch time.
  pub context: Value,
}

impl InputEnvelope {
  pub fn new(config: Value, context: Value) -> Self {
    Self { config, context }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
  Ok,
  Error,
}

/// Message a module writes to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEnvelope {
  pub status: EnvelopeStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl OutputEnvelope {
  pub fn ok(output: Value) -> Self {
    Self {
      status: EnvelopeStatus::Ok,
      output: Some(output),
      error: None,
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      status: EnvelopeStatus::Error,
      output: None,
      error: Some(message.into()),
    }
  }

  /// Parse raw module output.
  ///
  /// Surrounding whitespace is ignored; anything else that is not exactly one
  /// envelope object is a [`SandboxFault::MalformedOutput`].
  pub fn parse(bytes: &[u8]) -> Result<Self, SandboxFault> {
    let text = std::str::from_utf8(bytes)
      .map_err(|e| SandboxFault::malformed(format!("output is not valid UTF-8: {e}")))?;

    let text = text.trim();
    if text.is_empty() {
      return Err(SandboxFault::malformed("module produced no output"));
    }

    serde_json::from_str(text)
      .map_err(|e| SandboxFault::malformed(format!("output is not a valid envelope: {e}")))
  }

  pub fn is_ok(&self) -> bool {
    self.status == EnvelopeStatus::Ok
  }

  /// The output value on success (`null` when absent), or the error message.
  pub fn into_result(self) -> Result<Value, String> {
    match self.status {
      EnvelopeStatus::Ok => Ok(self.output.unwrap_or(Value::Null)),
      EnvelopeStatus::Error => Err(
        self
          .error
          .filter(|message| !message.trim().is_empty())
          .unwrap_or_else(|| "unknown error".to_string()),
      ),
    }
  }
}
