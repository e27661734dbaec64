//! Run events and notifiers for observability.
//!
//! Events are emitted as a run progresses so that consumers can follow along:
//! persist state, stream to a UI, collect metrics.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::report::{RunStatus, TaskFailure};

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    workflow: String,
  },

  /// A task attempt was handed to the action binder.
  TaskDispatched {
    run_id: String,
    task_id: String,
    runtime: String,
    attempt: u32,
  },

  TaskSucceeded {
    run_id: String,
    task_id: String,
    output: serde_json::Value,
  },

  /// A task failed for good.
  TaskFailed {
    run_id: String,
    task_id: String,
    error: TaskFailure,
  },

  /// An attempt failed and the task will be dispatched again.
  TaskRetrying {
    run_id: String,
    task_id: String,
    attempt: u32,
    delay_ms: u64,
    error: TaskFailure,
  },

  TaskSkipped {
    run_id: String,
    task_id: String,
    because: String,
  },

  TaskCancelled {
    run_id: String,
    task_id: String,
  },

  RunCompleted {
    run_id: String,
    status: RunStatus,
  },
}

/// Receives run events.
///
/// The scheduler calls `notify` for each event from its own loop, so
/// implementations should return quickly.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls the scheduler; volume is a
/// handful of events per task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
