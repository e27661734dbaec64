use std::collections::{HashMap, HashSet, VecDeque};

use crate::TaskSpec;

/// Dependency graph for traversal and analysis.
///
/// Edges point from a dependency to its dependents. Every list keeps task
/// declaration order so traversal is deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
  /// All task ids in declaration order.
  order: Vec<String>,
  /// Adjacency list: task_id -> list of dependent task_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: task_id -> list of dependency task_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Tasks with no dependencies.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from task specs.
  ///
  /// Dependencies naming unknown tasks are ignored here; validation reports
  /// them before a graph is ever built from untrusted input.
  pub fn new(tasks: &[TaskSpec]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

    for id in &order {
      adjacency.entry(id.clone()).or_default();
      reverse_adjacency.entry(id.clone()).or_default();
    }

    for task in tasks {
      for dep in &task.depends_on {
        if let Some(dependents) = adjacency.get_mut(dep) {
          dependents.push(task.id.clone());
          reverse_adjacency
            .entry(task.id.clone())
            .or_default()
            .push(dep.clone());
        }
      }
    }

    let entry_points: Vec<String> = order
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Get entry points (tasks with no dependencies).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get the direct dependents of a task.
  pub fn downstream(&self, task_id: &str) -> &[String] {
    self
      .adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get the direct dependencies of a task.
  pub fn upstream(&self, task_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// All tasks reachable by following dependent edges from `task_id`,
  /// excluding `task_id` itself unless it sits on a cycle.
  pub fn descendants(&self, task_id: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = self.downstream(task_id).iter().map(|s| s.as_str()).collect();

    while let Some(id) = stack.pop() {
      if seen.insert(id.to_string()) {
        stack.extend(self.downstream(id).iter().map(|s| s.as_str()));
      }
    }

    seen
  }

  /// Topological order via Kahn's algorithm.
  ///
  /// Returns the tasks left unvisited (in declaration order) when the graph
  /// contains a cycle.
  pub fn topological_order(&self) -> Result<Vec<String>, Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut queue: VecDeque<&str> = self
      .order
      .iter()
      .filter(|id| in_degree.get(id.as_str()) == Some(&0))
      .map(|id| id.as_str())
      .collect();

    let mut sorted = Vec::with_capacity(self.order.len());
    while let Some(id) = queue.pop_front() {
      sorted.push(id.to_string());
      for dependent in self.downstream(id) {
        if let Some(count) = in_degree.get_mut(dependent.as_str()) {
          *count -= 1;
          if *count == 0 {
            queue.push_back(dependent.as_str());
          }
        }
      }
    }

    if sorted.len() == self.order.len() {
      Ok(sorted)
    } else {
      let sorted: HashSet<&str> = sorted.iter().map(|s| s.as_str()).collect();
      Err(
        self
          .order
          .iter()
          .filter(|id| !sorted.contains(id.as_str()))
          .cloned()
          .collect(),
      )
    }
  }
}
