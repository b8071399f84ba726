//! Task discovery and registry (FA-002).
//!
//! Walks each task search root recursively and loads every file named
//! `manifest.yml` as a task. Walk order is deterministic: roots in the
//! order the job lists them, directory entries lexicographic. A manifest
//! that fails to load aborts discovery; duplicate task names are fatal.

use crate::error::EngineError;
use crate::manifest::Task;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const TASK_MANIFEST: &str = "manifest.yml";

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Task>,
}

impl TaskRegistry {
    /// Build a registry from the job's task search roots.
    pub fn discover(roots: &[PathBuf]) -> Result<TaskRegistry, EngineError> {
        let mut registry = TaskRegistry::default();
        for root in roots {
            registry.walk_root(root)?;
        }
        Ok(registry)
    }

    fn walk_root(&mut self, root: &Path) -> Result<(), EngineError> {
        if !root.is_dir() {
            return Err(EngineError::PathError {
                path: root.to_path_buf(),
                message: "task search path is not a directory".to_string(),
            });
        }

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| EngineError::io(
                format!("walking task search path {}", root.display()),
                e.into(),
            ))?;
            if !entry.file_type().is_file() || entry.file_name() != TASK_MANIFEST {
                continue;
            }

            debug!("loading task manifest at {}", entry.path().display());
            let task = Task::from_file(entry.path())?;
            if let Some(existing) = self.tasks.get(&task.name) {
                return Err(EngineError::DuplicateTaskName {
                    name: task.name,
                    first: existing.path.join(TASK_MANIFEST),
                    second: task.path.join(TASK_MANIFEST),
                });
            }
            self.tasks.insert(task.name.clone(), task);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Sorted task names, for diagnostics and the discovery banner.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use std::fs;

    fn write_task(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(TASK_MANIFEST),
            format!(
                "name: {name}\nenv:\n  OUT: output path\nrun:\n  command: echo {name}\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_FA002_discovers_nested_tasks() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("extract"), "extract");
        write_task(&root.path().join("group/load"), "load");

        let registry = TaskRegistry::discover(&[root.path().to_path_buf()]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("extract").is_some());
        assert!(registry.get("load").is_some());
        assert_eq!(registry.names(), vec!["extract", "load"]);
    }

    #[test]
    fn test_FA002_task_path_is_manifest_dir() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("extract"), "extract");

        let registry = TaskRegistry::discover(&[root.path().to_path_buf()]).unwrap();
        let task = registry.get("extract").unwrap();
        assert!(task.path.ends_with("extract"));
    }

    #[test]
    fn test_FA002_ignores_other_files() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("extract"), "extract");
        fs::write(root.path().join("README.md"), "not a task").unwrap();
        fs::write(root.path().join("extract/run.sh"), "echo hi").unwrap();
        // the match is case-sensitive and exact
        fs::write(root.path().join("Manifest.yml"), "name: nope\n").unwrap();

        let registry = TaskRegistry::discover(&[root.path().to_path_buf()]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_FA002_duplicate_names_fail_naming_both_paths() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("a"), "extract");
        write_task(&root.path().join("b"), "extract");

        let err = TaskRegistry::discover(&[root.path().to_path_buf()]).unwrap_err();
        match err {
            EngineError::DuplicateTaskName { name, first, second } => {
                assert_eq!(name, "extract");
                assert!(first.ends_with("a/manifest.yml"));
                assert!(second.ends_with("b/manifest.yml"));
            }
            other => panic!("expected DuplicateTaskName, got: {other}"),
        }
    }

    #[test]
    fn test_FA002_missing_root_is_path_error() {
        let err = TaskRegistry::discover(&[PathBuf::from("/no/such/root")]).unwrap_err();
        assert!(matches!(err, EngineError::PathError { .. }));
    }

    #[test]
    fn test_FA002_broken_manifest_aborts_discovery() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TASK_MANIFEST), "name: broken\n").unwrap();

        let err = TaskRegistry::discover(&[root.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn test_FA002_roots_walked_in_user_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_task(&first.path().join("one"), "one");
        write_task(&second.path().join("two"), "two");

        let registry = TaskRegistry::discover(&[
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ])
        .unwrap();
        let keys: Vec<&String> = registry.tasks.keys().collect();
        assert_eq!(keys, vec!["one", "two"]);
    }

    #[test]
    fn test_FA002_empty_roots_give_empty_registry() {
        let registry = TaskRegistry::discover(&[]).unwrap();
        assert!(registry.is_empty());
    }
}
