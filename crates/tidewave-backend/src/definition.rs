//! Workflow definitions and pre-deploy validation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BackendError;

/// A deployable workflow: an identifier plus its task graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub tasks: Vec<TaskDefinition>,
  /// Wall-clock ceiling for one execution, in seconds. None means no limit.
  #[serde(default)]
  pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
  pub id: String,
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub params: serde_json::Value,
}

impl WorkflowDefinition {
  pub fn new(id: impl Into<String>, tasks: Vec<TaskDefinition>) -> Self {
    let id = id.into();
    Self {
      name: id.clone(),
      id,
      tasks,
      timeout_seconds: None,
    }
  }

  /// Validate the definition before deploy.
  ///
  /// Hard failures: empty id, no tasks, a dependency naming a task that is
  /// not part of the definition, or a cycle among the definition's tasks.
  /// Identifiers outside `[A-Za-z0-9_-]` only warn; some deployments carry
  /// legacy ids.
  pub fn validate(&self) -> Result<Vec<String>, BackendError> {
    if self.id.trim().is_empty() {
      return Err(BackendError::Validation(
        "workflow id must not be empty".to_string(),
      ));
    }
    if self.tasks.is_empty() {
      return Err(BackendError::Validation(format!(
        "workflow {} defines no tasks",
        self.id
      )));
    }

    let task_ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &self.tasks {
      for dep in &task.depends_on {
        if !task_ids.contains(dep.as_str()) {
          return Err(BackendError::Validation(format!(
            "task {} depends on undefined task {dep}",
            task.id
          )));
        }
      }
    }

    if let Some(cycle) = self.find_cycle() {
      return Err(BackendError::Validation(format!(
        "task dependency cycle: {}",
        cycle.join(" -> ")
      )));
    }

    let mut warnings = Vec::new();
    for id in std::iter::once(self.id.as_str()).chain(self.tasks.iter().map(|t| t.id.as_str())) {
      if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
      {
        let message = format!("identifier {id:?} contains characters outside [A-Za-z0-9_-]");
        warn!(workflow_id = %self.id, "{message}");
        warnings.push(message);
      }
    }
    Ok(warnings)
  }

  /// DFS over the task graph; returns the first cycle found.
  fn find_cycle(&self) -> Option<Vec<String>> {
    let adjacency: HashMap<&str, &[String]> = self
      .tasks
      .iter()
      .map(|t| (t.id.as_str(), t.depends_on.as_slice()))
      .collect();

    fn visit<'a>(
      node: &'a str,
      adjacency: &HashMap<&'a str, &'a [String]>,
      visited: &mut HashSet<&'a str>,
      stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      if let Some(position) = stack.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = stack[position..].iter().map(|n| n.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
      }
      if !visited.insert(node) {
        return None;
      }
      stack.push(node);
      if let Some(deps) = adjacency.get(node) {
        for dep in deps.iter() {
          if let Some(cycle) = visit(dep, adjacency, visited, stack) {
            return Some(cycle);
          }
        }
      }
      stack.pop();
      None
    }

    let mut visited = HashSet::new();
    for task in &self.tasks {
      let mut stack = Vec::new();
      if let Some(cycle) = visit(task.id.as_str(), &adjacency, &mut visited, &mut stack) {
        return Some(cycle);
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(id: &str, deps: &[&str]) -> TaskDefinition {
    TaskDefinition {
      id: id.to_string(),
      depends_on: deps.iter().map(|d| d.to_string()).collect(),
      params: serde_json::Value::Null,
    }
  }

  #[test]
  fn valid_definition_passes() {
    let def = WorkflowDefinition::new(
      "unit-migration",
      vec![task("analyze", &[]), task("generate", &["analyze"])],
    );
    assert!(def.validate().unwrap().is_empty());
  }

  #[test]
  fn empty_id_is_rejected() {
    let def = WorkflowDefinition::new("  ", vec![task("a", &[])]);
    assert!(matches!(def.validate(), Err(BackendError::Validation(_))));
  }

  #[test]
  fn empty_task_list_is_rejected() {
    let def = WorkflowDefinition::new("w", vec![]);
    assert!(matches!(def.validate(), Err(BackendError::Validation(_))));
  }

  #[test]
  fn dangling_dependency_is_rejected() {
    let def = WorkflowDefinition::new("w", vec![task("a", &["ghost"])]);
    let err = def.validate().unwrap_err();
    assert!(err.to_string().contains("ghost"));
  }

  #[test]
  fn internal_cycle_is_rejected() {
    let def = WorkflowDefinition::new("w", vec![task("a", &["b"]), task("b", &["a"])]);
    let err = def.validate().unwrap_err();
    assert!(err.to_string().contains("cycle"));
  }

  #[test]
  fn odd_identifiers_warn_but_pass() {
    let def = WorkflowDefinition::new("w", vec![task("étape un", &[])]);
    let warnings = def.validate().unwrap();
    assert_eq!(warnings.len(), 1);
  }
}
