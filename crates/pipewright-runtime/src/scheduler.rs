//! Dependency-graph scheduler.
//!
//! The [`Scheduler`] walks a validated [`WorkflowGraph`] and drives each task
//! through its state machine:
//!
//! ```text
//! Pending -> Ready -> Running -> Succeeded
//!                        |
//!                        +-> Failed -> (downstream) Skipped
//! Pending / Ready -> Cancelled   (run aborted)
//! ```
//!
//! Bookkeeping happens synchronously on the scheduler loop. The loop only
//! suspends while waiting for an invocation to finish, a retry delay to
//! elapse, the cancel signal, or the run timeout.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use pipewright_catalog::RuntimeCatalog;
use pipewright_sandbox::{Limits, Sandbox};
use pipewright_workflow::WorkflowGraph;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::binder::ActionBinder;
use crate::context::ContextStore;
use crate::error::{RuntimeError, TaskError, TaskErrorKind};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::report::{RunOutcome, RunReport, RunStatus, TaskFailure, TaskReport, TaskState};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// Maximum number of tasks in `Running` at once.
  pub max_concurrency: usize,
  /// Default per-invocation limits.
  pub limits: Limits,
  /// Abort the whole run after this long.
  pub run_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      max_concurrency: std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4),
      limits: Limits::default(),
      run_timeout: None,
    }
  }
}

impl SchedulerConfig {
  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = max_concurrency;
    self
  }

  pub fn with_limits(mut self, limits: Limits) -> Self {
    self.limits = limits;
    self
  }

  pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
    self.run_timeout = Some(run_timeout);
    self
  }
}

/// Executes workflow graphs against a catalog and a sandbox.
pub struct Scheduler {
  catalog: Arc<dyn RuntimeCatalog>,
  sandbox: Arc<dyn Sandbox>,
  config: SchedulerConfig,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Scheduler {
  pub fn new(
    catalog: Arc<dyn RuntimeCatalog>,
    sandbox: Arc<dyn Sandbox>,
    config: SchedulerConfig,
  ) -> Self {
    Self {
      catalog,
      sandbox,
      config,
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// Send run events to `notifier`.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Run every task of `workflow` to a terminal state.
  ///
  /// `input` becomes the reserved `input` context entry. Cancelling `cancel`
  /// aborts the run: tasks not yet dispatched become `Cancelled` and in-flight
  /// invocations are dropped. Task failures never surface as `Err`; they are
  /// in the returned report.
  #[instrument(
    name = "scheduler_run",
    skip(self, workflow, input, cancel),
    fields(workflow = %workflow.name())
  )]
  pub async fn run(
    &self,
    workflow: &WorkflowGraph,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<RunOutcome, RuntimeError> {
    if self.config.max_concurrency == 0 {
      return Err(RuntimeError::InvalidConfig {
        message: "max_concurrency must be at least 1".to_string(),
      });
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let _usage = self.catalog.usage().acquire(workflow.runtimes());

    info!(
      run_id = %run_id,
      tasks = workflow.len(),
      max_concurrency = self.config.max_concurrency,
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      workflow: workflow.name().to_string(),
    });

    let context = Arc::new(ContextStore::new(input));
    let binder = ActionBinder::new(
      self.catalog.clone(),
      self.sandbox.clone(),
      context.clone(),
      self.config.limits,
    );

    let mut run = RunState::new(
      workflow,
      &run_id,
      self.notifier.as_ref(),
      cancel.child_token(),
    );
    run
      .drive(&binder, self.config.max_concurrency, self.config.run_timeout)
      .await;

    let report = run.into_report();
    info!(
      run_id = %run_id,
      status = ?report.run_status,
      succeeded = report.ids_in(TaskState::Succeeded).len(),
      failed = report.ids_in(TaskState::Failed).len(),
      skipped = report.ids_in(TaskState::Skipped).len(),
      cancelled = report.ids_in(TaskState::Cancelled).len(),
      "run_completed"
    );
    self.notifier.notify(ExecutionEvent::RunCompleted {
      run_id,
      status: report.run_status,
    });

    Ok(RunOutcome {
      report,
      context: context.snapshot(),
    })
  }
}

/// Messages from spawned work back to the scheduler loop.
enum Wakeup {
  Finished(usize, Result<Value, TaskError>),
  RetryDue(usize),
}

/// Mutable bookkeeping for one run. Indexes follow definition order.
struct RunState<'a> {
  workflow: &'a WorkflowGraph,
  run_id: &'a str,
  notifier: &'a dyn ExecutionNotifier,
  cancel: CancellationToken,
  states: Vec<TaskState>,
  /// Dependencies not yet succeeded.
  waiting_on: Vec<usize>,
  attempts: Vec<u32>,
  errors: Vec<Option<TaskFailure>>,
  skipped_because: Vec<Option<String>>,
  /// FIFO of tasks ready for dispatch.
  ready: VecDeque<usize>,
  running: usize,
  aborted: bool,
}

impl<'a> RunState<'a> {
  fn new(
    workflow: &'a WorkflowGraph,
    run_id: &'a str,
    notifier: &'a dyn ExecutionNotifier,
    cancel: CancellationToken,
  ) -> Self {
    let len = workflow.len();
    let waiting_on: Vec<usize> = workflow.tasks().iter().map(|t| t.depends_on.len()).collect();

    let mut states = vec![TaskState::Pending; len];
    let mut ready = VecDeque::new();
    for (idx, remaining) in waiting_on.iter().enumerate() {
      if *remaining == 0 {
        states[idx] = TaskState::Ready;
        ready.push_back(idx);
      }
    }

    Self {
      workflow,
      run_id,
      notifier,
      cancel,
      states,
      waiting_on,
      attempts: vec![0; len],
      errors: vec![None; len],
      skipped_because: vec![None; len],
      ready,
      running: 0,
      aborted: false,
    }
  }

  async fn drive(
    &mut self,
    binder: &ActionBinder,
    max_concurrency: usize,
    run_timeout: Option<Duration>,
  ) {
    let mut inflight: JoinSet<Wakeup> = JoinSet::new();
    let deadline = run_timeout.map(|t| Instant::now() + t);
    let timeout = async {
      match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
      }
    };
    tokio::pin!(timeout);

    loop {
      if !self.aborted && self.cancel.is_cancelled() {
        self.abort();
      }

      while self.running < max_concurrency
        && let Some(idx) = self.ready.pop_front()
      {
        self.dispatch(idx, binder, &mut inflight);
      }

      if inflight.is_empty() {
        break;
      }

      tokio::select! {
        biased;
        _ = self.cancel.cancelled(), if !self.aborted => {}
        _ = &mut timeout, if !self.aborted => {
          warn!(run_id = %self.run_id, "run timed out");
          self.cancel.cancel();
        }
        Some(joined) = inflight.join_next() => match joined {
          Ok(Wakeup::Finished(idx, result)) => {
            self.running -= 1;
            self.finish(idx, result, &mut inflight);
          }
          Ok(Wakeup::RetryDue(idx)) => {
            if self.states[idx] == TaskState::Ready {
              self.ready.push_back(idx);
            }
          }
          // Spawned futures catch their own panics and are never aborted.
          Err(e) => error!(run_id = %self.run_id, error = %e, "scheduler task lost"),
        },
      }
    }
  }

  fn dispatch(&mut self, idx: usize, binder: &ActionBinder, inflight: &mut JoinSet<Wakeup>) {
    let workflow = self.workflow;
    let task = &workflow.tasks()[idx];
    self.states[idx] = TaskState::Running;
    self.attempts[idx] += 1;
    self.running += 1;

    let attempt = self.attempts[idx];
    info!(
      run_id = %self.run_id,
      task_id = %task.id,
      runtime = %task.runtime,
      attempt,
      "task_started"
    );
    self.notifier.notify(ExecutionEvent::TaskDispatched {
      run_id: self.run_id.to_string(),
      task_id: task.id.clone(),
      runtime: task.runtime.clone(),
      attempt,
    });

    let action = binder.bind(task);
    let cancel = self.cancel.clone();
    inflight.spawn(async move {
      let result = AssertUnwindSafe(action.invoke(&cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
          Err(action.error(TaskErrorKind::Panicked {
            message: panic_message(panic.as_ref()),
          }))
        });
      Wakeup::Finished(idx, result)
    });
  }

  fn finish(
    &mut self,
    idx: usize,
    result: Result<Value, TaskError>,
    inflight: &mut JoinSet<Wakeup>,
  ) {
    let workflow = self.workflow;
    let task = &workflow.tasks()[idx];

    let err = match result {
      Ok(output) => {
        self.states[idx] = TaskState::Succeeded;
        info!(run_id = %self.run_id, task_id = %task.id, "task_succeeded");
        self.notifier.notify(ExecutionEvent::TaskSucceeded {
          run_id: self.run_id.to_string(),
          task_id: task.id.clone(),
          output,
        });
        self.release_dependents(idx);
        return;
      }
      Err(err) => err,
    };

    if err.is_cancelled() {
      self.states[idx] = TaskState::Cancelled;
      self.notify_cancelled(idx);
      self.skip_downstream(idx);
      return;
    }

    let failure = TaskFailure::from(&err);
    let retries_left = self.attempts[idx] <= task.max_retry_attempts;
    if retries_left && !self.aborted {
      let delay_ms = task.retry_delay_ms.unwrap_or(0);
      warn!(
        run_id = %self.run_id,
        task_id = %task.id,
        attempt = self.attempts[idx],
        delay_ms,
        error = %err,
        "task_retrying"
      );
      self.notifier.notify(ExecutionEvent::TaskRetrying {
        run_id: self.run_id.to_string(),
        task_id: task.id.clone(),
        attempt: self.attempts[idx],
        delay_ms,
        error: failure,
      });

      self.states[idx] = TaskState::Ready;
      if delay_ms == 0 {
        self.ready.push_back(idx);
      } else {
        let cancel = self.cancel.clone();
        inflight.spawn(async move {
          tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            _ = cancel.cancelled() => {}
          }
          Wakeup::RetryDue(idx)
        });
      }
      return;
    }

    if err.is_fault() {
      error!(
        run_id = %self.run_id,
        task_id = %task.id,
        runtime = %task.runtime,
        kind = err.kind.name(),
        error = %err.kind,
        "task_failed"
      );
    } else {
      warn!(
        run_id = %self.run_id,
        task_id = %task.id,
        runtime = %task.runtime,
        kind = err.kind.name(),
        error = %err.kind,
        "task_failed"
      );
    }

    self.states[idx] = TaskState::Failed;
    self.notifier.notify(ExecutionEvent::TaskFailed {
      run_id: self.run_id.to_string(),
      task_id: task.id.clone(),
      error: failure.clone(),
    });
    self.errors[idx] = Some(failure);
    self.skip_downstream(idx);
  }

  /// A task succeeded: dependents whose last dependency this was become ready.
  fn release_dependents(&mut self, idx: usize) {
    let workflow = self.workflow;
    for dependent in workflow.graph().downstream(&workflow.tasks()[idx].id) {
      let Some(d) = workflow.index_of(dependent) else {
        continue;
      };
      self.waiting_on[d] = self.waiting_on[d].saturating_sub(1);
      if self.waiting_on[d] == 0 && self.states[d] == TaskState::Pending {
        self.states[d] = TaskState::Ready;
        self.ready.push_back(d);
      }
    }
  }

  /// Mark every pending transitive dependent of `idx` as skipped.
  fn skip_downstream(&mut self, idx: usize) {
    let workflow = self.workflow;
    let mut stack = vec![idx];

    while let Some(cause) = stack.pop() {
      let cause_id = &workflow.tasks()[cause].id;
      for dependent in workflow.graph().downstream(cause_id) {
        let Some(d) = workflow.index_of(dependent) else {
          continue;
        };
        if self.states[d] != TaskState::Pending {
          continue;
        }

        self.states[d] = TaskState::Skipped;
        self.skipped_because[d] = Some(cause_id.clone());
        info!(
          run_id = %self.run_id,
          task_id = %dependent,
          because = %cause_id,
          "task_skipped"
        );
        self.notifier.notify(ExecutionEvent::TaskSkipped {
          run_id: self.run_id.to_string(),
          task_id: dependent.clone(),
          because: cause_id.clone(),
        });
        stack.push(d);
      }
    }
  }

  /// Cancel everything not yet dispatched. In-flight tasks see the token.
  fn abort(&mut self) {
    self.aborted = true;
    self.ready.clear();
    warn!(run_id = %self.run_id, running = self.running, "run aborted");

    for idx in 0..self.states.len() {
      if matches!(self.states[idx], TaskState::Pending | TaskState::Ready) {
        self.states[idx] = TaskState::Cancelled;
        self.notify_cancelled(idx);
      }
    }
  }

  fn notify_cancelled(&self, idx: usize) {
    self.notifier.notify(ExecutionEvent::TaskCancelled {
      run_id: self.run_id.to_string(),
      task_id: self.workflow.tasks()[idx].id.clone(),
    });
  }

  fn into_report(self) -> RunReport {
    let run_status = if self.states.iter().all(|s| *s == TaskState::Succeeded) {
      RunStatus::Succeeded
    } else if self.aborted {
      RunStatus::Cancelled
    } else {
      RunStatus::Failed
    };

    let mut errors = self.errors;
    let mut skipped_because = self.skipped_because;
    let tasks = self
      .workflow
      .tasks()
      .iter()
      .enumerate()
      .map(|(idx, task)| {
        let state = self.states[idx];
        TaskReport {
          id: task.id.clone(),
          runtime: task.runtime.clone(),
          state,
          attempts: self.attempts[idx],
          output_ref: (state == TaskState::Succeeded).then(|| task.id.clone()),
          error: errors[idx].take(),
          skipped_because: skipped_because[idx].take(),
        }
      })
      .collect();

    RunReport {
      run_id: self.run_id.to_string(),
      workflow: self.workflow.name().to_string(),
      run_status,
      tasks,
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
