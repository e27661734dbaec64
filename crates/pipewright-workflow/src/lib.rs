//! Pipewright Workflow
//!
//! This crate provides the validated workflow representation for pipewright.
//! A [`WorkflowGraph`] is built once from a [`WorkflowDef`] and is immutable
//! afterwards; the scheduler only ever reads it.
//!
//! Key differences from `pipewright-config`:
//! - Task ids are unique and every dependency resolves within the graph
//! - The dependency graph is acyclic
//! - Template references in task configuration can be satisfied by the
//!   time the referencing task is dispatched
//!
//! [`WorkflowDef`]: pipewright_config::WorkflowDef

mod error;
mod graph;
mod loader;
pub mod references;
mod task;
mod workflow;

pub use error::DefinitionError;
pub use graph::Graph;
pub use loader::{LoadedFile, load_dir};
pub use pipewright_config::DocumentFormat;
pub use task::TaskSpec;
pub use workflow::{WorkflowGraph, load_file, parse, parse_document};

/// Context key reserved for the run's initial invocation payload.
pub const INPUT_KEY: &str = "input";
