//! Pipewright Runtime
//!
//! This crate executes validated workflow graphs. It ties the pieces
//! together:
//!
//! - [`ContextStore`]: write-once task outputs for one run, plus `input`
//! - [`ActionBinder`]: resolves a task's runtime and configuration and runs it
//!   through a [`Sandbox`](pipewright_sandbox::Sandbox)
//! - [`Scheduler`]: walks the dependency graph with a concurrency cap,
//!   propagates skips, retries, and honours cancellation
//!
//! A run always ends with a [`RunReport`] covering every task.

mod binder;
mod context;
mod error;
mod events;
mod report;
mod scheduler;
mod template;

pub use binder::{ActionBinder, BoundAction};
pub use context::{ContextSnapshot, ContextStore};
pub use error::{ContextError, RuntimeError, TaskError, TaskErrorKind};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use report::{RunOutcome, RunReport, RunStatus, TaskFailure, TaskReport, TaskState};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use template::{check_shape, resolve_config};
