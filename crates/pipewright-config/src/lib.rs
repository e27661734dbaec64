//! Pipewright Config
//!
//! This crate contains the serializable workflow definition types for
//! pipewright. These types describe a workflow as it was written, before the
//! definition model validates it into an executable graph.
//!
//! Definitions are JSON documents, or TOML files with a `[workflow]` table.
//! Nothing in here checks references, cycles or cron syntax; that happens in
//! `pipewright-workflow`.

mod error;
mod format;
mod schedule;
mod task;
mod workflow;

pub use error::ConfigError;
pub use format::DocumentFormat;
pub use schedule::{ScheduleDef, TriggerDef};
pub use task::TaskDef;
pub use workflow::WorkflowDef;
