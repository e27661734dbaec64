use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use pipewright_config::{DocumentFormat, ScheduleDef, TriggerDef, WorkflowDef};

use crate::INPUT_KEY;
use crate::error::DefinitionError;
use crate::graph::Graph;
use crate::references;
use crate::task::TaskSpec;

/// A validated workflow ready for execution.
///
/// Built once per run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
  name: String,
  description: Option<String>,
  schedule: Option<ScheduleDef>,
  triggers: Option<TriggerDef>,
  tasks: Vec<TaskSpec>,
  index: HashMap<String, usize>,
  graph: Graph,
}

/// Parse and validate a JSON workflow definition document.
pub fn parse(raw: &str) -> Result<WorkflowGraph, DefinitionError> {
  parse_document(raw, DocumentFormat::Json)
}

/// Parse and validate a workflow document in the given format.
pub fn parse_document(raw: &str, format: DocumentFormat) -> Result<WorkflowGraph, DefinitionError> {
  let def = WorkflowDef::parse(raw, format)?;
  WorkflowGraph::from_def(def)
}

/// Read, parse and validate a `.json` or `.toml` workflow file.
pub fn load_file(path: &Path) -> Result<WorkflowGraph, DefinitionError> {
  let def = WorkflowDef::from_file(path)?;
  WorkflowGraph::from_def(def)
}

impl WorkflowGraph {
  /// Validate a definition and build its graph.
  pub fn from_def(def: WorkflowDef) -> Result<Self, DefinitionError> {
    if def.name.trim().is_empty() {
      return Err(DefinitionError::EmptyName);
    }
    if def.tasks.is_empty() {
      return Err(DefinitionError::NoTasks { workflow: def.name });
    }

    let tasks: Vec<TaskSpec> = def.tasks.into_iter().map(TaskSpec::from).collect();
    let index = index_tasks(&tasks)?;
    validate_dependencies(&tasks, &index)?;

    let graph = Graph::new(&tasks);
    graph
      .topological_order()
      .map_err(|task_ids| DefinitionError::Cycle { task_ids })?;

    validate_references(&tasks, &index, &graph)?;
    if let Some(schedule) = &def.schedule {
      validate_schedule(schedule)?;
    }
    if let Some(triggers) = &def.triggers
      && triggers.on_event.trim().is_empty()
    {
      return Err(DefinitionError::InvalidTrigger {
        reason: "on_event must not be empty".to_string(),
      });
    }

    Ok(Self {
      name: def.name,
      description: def.description,
      schedule: def.schedule,
      triggers: def.triggers,
      tasks,
      index,
      graph,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn schedule(&self) -> Option<&ScheduleDef> {
    self.schedule.as_ref()
  }

  pub fn triggers(&self) -> Option<&TriggerDef> {
    self.triggers.as_ref()
  }

  /// Tasks in declaration order.
  pub fn tasks(&self) -> &[TaskSpec] {
    &self.tasks
  }

  /// Get a task by id.
  pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
    self.index.get(task_id).map(|&i| &self.tasks[i])
  }

  /// Position of a task in declaration order.
  pub fn index_of(&self, task_id: &str) -> Option<usize> {
    self.index.get(task_id).copied()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Distinct runtime names used by this workflow.
  pub fn runtimes(&self) -> BTreeSet<&str> {
    self.tasks.iter().map(|t| t.runtime.as_str()).collect()
  }

  /// A dependency-respecting order of all task ids.
  pub fn topological_order(&self) -> Vec<String> {
    // Acyclicity was checked when the graph was built.
    self.graph.topological_order().unwrap_or_default()
  }
}

fn index_tasks(tasks: &[TaskSpec]) -> Result<HashMap<String, usize>, DefinitionError> {
  let mut index = HashMap::with_capacity(tasks.len());

  for (i, task) in tasks.iter().enumerate() {
    if task.id.trim().is_empty() {
      return Err(DefinitionError::EmptyId);
    }
    if task.id == INPUT_KEY {
      return Err(DefinitionError::ReservedId {
        task_id: task.id.clone(),
      });
    }
    if index.insert(task.id.clone(), i).is_some() {
      return Err(DefinitionError::DuplicateId {
        task_id: task.id.clone(),
      });
    }
    if task.runtime.trim().is_empty() {
      return Err(DefinitionError::EmptyRuntime {
        task_id: task.id.clone(),
      });
    }
  }

  Ok(index)
}

fn validate_dependencies(
  tasks: &[TaskSpec],
  index: &HashMap<String, usize>,
) -> Result<(), DefinitionError> {
  for task in tasks {
    for dep in &task.depends_on {
      if dep == &task.id {
        return Err(DefinitionError::Cycle {
          task_ids: vec![task.id.clone()],
        });
      }
      if !index.contains_key(dep) {
        return Err(DefinitionError::UnknownDependency {
          task_id: task.id.clone(),
          dependency: dep.clone(),
        });
      }
    }
  }
  Ok(())
}

/// Reject references that can never be satisfied at dispatch time.
///
/// A reference to an unrelated task is allowed: it may or may not have
/// completed by then, and a miss surfaces as `PathNotFound` during the run.
fn validate_references(
  tasks: &[TaskSpec],
  index: &HashMap<String, usize>,
  graph: &Graph,
) -> Result<(), DefinitionError> {
  for task in tasks {
    let roots = references::collect_roots(&task.config);
    if roots.is_empty() {
      continue;
    }

    let descendants: HashSet<String> = graph.descendants(&task.id);
    for root in roots {
      if root == INPUT_KEY {
        continue;
      }
      if !index.contains_key(&root) || root == task.id || descendants.contains(&root) {
        return Err(DefinitionError::UnreachableReference {
          task_id: task.id.clone(),
          reference: root,
        });
      }
    }
  }
  Ok(())
}

/// Shape check only: five or six fields of cron characters, and a timezone
/// name without whitespace. Field ranges are left to whoever fires it.
fn validate_schedule(schedule: &ScheduleDef) -> Result<(), DefinitionError> {
  let invalid = |reason: String| DefinitionError::InvalidSchedule { reason };

  let fields: Vec<&str> = schedule.cron.split_whitespace().collect();
  if !(5..=6).contains(&fields.len()) {
    return Err(invalid(format!(
      "cron expression '{}' has {} fields, expected 5 or 6",
      schedule.cron,
      fields.len()
    )));
  }
  if let Some(field) = fields.iter().find(|field| {
    !field
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | ',' | '-' | '/' | '?' | '#'))
  }) {
    return Err(invalid(format!("cron field '{field}' contains unexpected characters")));
  }

  let timezone = schedule.timezone.trim();
  if timezone.is_empty() || timezone.contains(char::is_whitespace) {
    return Err(invalid(format!("'{}' is not a timezone name", schedule.timezone)));
  }

  Ok(())
}
