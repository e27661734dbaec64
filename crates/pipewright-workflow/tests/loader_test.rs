//! Tests for loading a directory of workflow files.

use std::fs;
use std::path::Path;

use pipewright_workflow::{DefinitionError, load_dir, load_file};

fn write(dir: &Path, file: &str, contents: &str) {
  fs::write(dir.join(file), contents).unwrap();
}

fn toml_workflow(name: &str) -> String {
  format!("[workflow]\nname = \"{name}\"\n\n[[workflow.tasks]]\nid = \"a\"\nruntime = \"echo\"\n")
}

#[test]
fn test_load_empty_directory() {
  let dir = tempfile::tempdir().unwrap();
  assert!(load_dir(dir.path()).unwrap().is_empty());
}

#[test]
fn test_load_mixed_formats_in_name_order() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "b.toml", &toml_workflow("beta"));
  write(
    dir.path(),
    "a.json",
    r#"{"name": "alpha", "tasks": [{"id": "a", "runtime": "echo"}]}"#,
  );
  write(dir.path(), "notes.md", "not a workflow");
  fs::create_dir(dir.path().join("nested.toml")).unwrap();

  let loaded = load_dir(dir.path()).unwrap();
  let names: Vec<&str> = loaded
    .iter()
    .map(|file| file.result.as_ref().unwrap().name())
    .collect();
  assert_eq!(names, vec!["alpha", "beta"]);
  assert!(loaded[0].path.ends_with("a.json"));
}

#[test]
fn test_invalid_file_does_not_stop_others() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "a.toml", "[workflow\nname = ");
  write(dir.path(), "b.toml", &toml_workflow("good"));

  let loaded = load_dir(dir.path()).unwrap();
  assert_eq!(loaded.len(), 2);
  assert!(matches!(loaded[0].result, Err(DefinitionError::Parse(_))));
  assert_eq!(loaded[1].result.as_ref().unwrap().name(), "good");
}

#[test]
fn test_duplicate_workflow_name() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "one.toml", &toml_workflow("same"));
  write(dir.path(), "two.toml", &toml_workflow("same"));

  let loaded = load_dir(dir.path()).unwrap();
  assert!(loaded[0].result.is_ok());
  match &loaded[1].result {
    Err(DefinitionError::DuplicateWorkflow { name, first }) => {
      assert_eq!(name, "same");
      assert!(first.ends_with("one.toml"));
    }
    other => panic!("expected DuplicateWorkflow, got {other:?}"),
  }
}

#[test]
fn test_missing_directory() {
  let dir = tempfile::tempdir().unwrap();
  assert!(matches!(
    load_dir(&dir.path().join("nope")),
    Err(DefinitionError::ReadDir { .. })
  ));
}

#[test]
fn test_load_single_file() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "flow.toml", &toml_workflow("single"));
  assert_eq!(load_file(&dir.path().join("flow.toml")).unwrap().name(), "single");

  write(dir.path(), "flow.yaml", "name: single");
  assert!(matches!(
    load_file(&dir.path().join("flow.yaml")),
    Err(DefinitionError::Parse(_))
  ));
}
