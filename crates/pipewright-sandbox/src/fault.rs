use std::time::Duration;

use thiserror::Error;

/// Ways a sandboxed invocation can fail without producing an envelope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxFault {
  #[error("timed out after {}ms", limit.as_millis())]
  Timeout { limit: Duration },

  /// Non-zero exit, trap, or a module that could not be started.
  #[error("crashed: {message}")]
  Crashed {
    message: String,
    exit_code: Option<i32>,
  },

  #[error("resource limit exceeded: {message}")]
  ResourceExceeded { message: String },

  /// The module's stdout is not a valid output envelope.
  #[error("malformed output: {message}")]
  MalformedOutput { message: String },
}

impl SandboxFault {
  pub fn crashed(message: impl Into<String>) -> Self {
    Self::Crashed {
      message: message.into(),
      exit_code: None,
    }
  }

  pub fn malformed(message: impl Into<String>) -> Self {
    Self::MalformedOutput {
      message: message.into(),
    }
  }

  pub fn resource_exceeded(message: impl Into<String>) -> Self {
    Self::ResourceExceeded {
      message: message.into(),
    }
  }

  /// Short stable name of the fault class, for logs and reports.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Timeout { .. } => "timeout",
      Self::Crashed { .. } => "crashed",
      Self::ResourceExceeded { .. } => "resource_exceeded",
      Self::MalformedOutput { .. } => "malformed_output",
    }
  }
}

/// Errors setting up the sandbox itself.
#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("failed to create wasmtime engine: {0}")]
  Engine(wasmtime::Error),

  #[error("failed to start epoch ticker: {0}")]
  Ticker(#[from] std::io::Error),
}
