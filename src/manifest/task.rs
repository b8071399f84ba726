//! Task model and loader (FA-001).
//!
//! A task is a reusable executable template: the env keys it requires
//! (values are documentation, never defaults) and how to run it.

use super::env;
use super::{is_identifier, parse_document, read_manifest, schema_error};
use crate::error::EngineError;
use crate::shellwords;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A reusable executable template, loaded from a `manifest.yml`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub name: String,

    /// Directory containing the task's manifest.
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared variables: key is the env name a command must supply, value
    /// is a human description used in diagnostics.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    pub run: Run,
}

/// How a task executes. Exactly one form is present in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Run {
    /// `interpreter` is POSIX-word-split into argv; `script` is appended as
    /// one final argument.
    Inline { interpreter: String, script: String },
    /// A shell line, executed as `/bin/sh -c <command>`.
    Command { command: String },
}

impl Run {
    /// The argv this run form spawns. The interpreter was tokenised at load
    /// time, so splitting again cannot fail for a loaded task.
    pub fn argv(&self) -> Result<Vec<String>, shellwords::SplitError> {
        match self {
            Run::Inline {
                interpreter,
                script,
            } => {
                let mut argv = shellwords::split(interpreter)?;
                argv.push(script.clone());
                Ok(argv)
            }
            Run::Command { command } => Ok(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                command.clone(),
            ]),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskDoc {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "env::task_env")]
    env: IndexMap<String, String>,
    run: RunDoc,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunDoc {
    #[serde(default)]
    interpreter: Option<String>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

impl Task {
    pub fn from_file(path: &Path) -> Result<Task, EngineError> {
        let (text, abs) = read_manifest(path)?;
        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::from_yaml(&text, &abs, &dir)
    }

    /// Parse a task manifest from YAML text. `dir` becomes the task's
    /// `path` and anchors relative script references.
    pub fn from_yaml(text: &str, origin: &Path, dir: &Path) -> Result<Task, EngineError> {
        let value = parse_document(text, origin)?;
        let doc: TaskDoc =
            serde_yaml::from_value(value).map_err(|e| schema_error(origin, e.to_string()))?;

        if !is_identifier(&doc.name) {
            return Err(schema_error(
                origin,
                format!("task name `{}` is not a valid identifier", doc.name),
            ));
        }

        let run = match (doc.run.interpreter, doc.run.script, doc.run.command) {
            (Some(interpreter), Some(script), None) => {
                let argv = shellwords::split(&interpreter)
                    .map_err(|e| schema_error(origin, format!("invalid run.interpreter: {e}")))?;
                if argv.is_empty() {
                    return Err(schema_error(origin, "run.interpreter must not be empty"));
                }
                Run::Inline {
                    interpreter,
                    script,
                }
            }
            (None, None, Some(command)) => Run::Command { command },
            _ => {
                return Err(schema_error(
                    origin,
                    "run must specify either `interpreter` and `script`, or `command`",
                ))
            }
        };

        Ok(Task {
            name: doc.name,
            path: dir.to_path_buf(),
            description: doc.description,
            env: doc.env,
            run,
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn load(yaml: &str) -> Result<Task, EngineError> {
        Task::from_yaml(
            yaml,
            Path::new("/tasks/greet/manifest.yml"),
            Path::new("/tasks/greet"),
        )
    }

    #[test]
    fn test_FA001_parse_inline_task() {
        let yaml = r#"
name: greet
description: say hello
env:
  NAME: who to greet
run:
  interpreter: /bin/sh -c
  script: echo "hello $NAME"
"#;
        let task = load(yaml).unwrap();
        assert_eq!(task.name, "greet");
        assert_eq!(task.path, PathBuf::from("/tasks/greet"));
        assert_eq!(task.env["NAME"], "who to greet");
        assert_eq!(
            task.run,
            Run::Inline {
                interpreter: "/bin/sh -c".to_string(),
                script: "echo \"hello $NAME\"".to_string(),
            }
        );
    }

    #[test]
    fn test_FA001_parse_command_task() {
        let yaml = r#"
name: list
run:
  command: ls -la
"#;
        let task = load(yaml).unwrap();
        assert_eq!(
            task.run,
            Run::Command {
                command: "ls -la".to_string()
            }
        );
    }

    #[test]
    fn test_FA001_inline_argv_appends_script() {
        let run = Run::Inline {
            interpreter: "python3 -c".to_string(),
            script: "print('ok')".to_string(),
        };
        assert_eq!(run.argv().unwrap(), vec!["python3", "-c", "print('ok')"]);
    }

    #[test]
    fn test_FA001_command_argv_uses_sh() {
        let run = Run::Command {
            command: "echo hi > out".to_string(),
        };
        assert_eq!(run.argv().unwrap(), vec!["/bin/sh", "-c", "echo hi > out"]);
    }

    #[test]
    fn test_FA001_both_run_forms_rejected() {
        let yaml = r#"
name: greet
run:
  interpreter: /bin/sh -c
  script: echo hi
  command: echo hi
"#;
        let err = load(yaml).unwrap_err();
        assert!(err.to_string().contains("either"));
    }

    #[test]
    fn test_FA001_neither_run_form_rejected() {
        let yaml = r#"
name: greet
run: {}
"#;
        let err = load(yaml).unwrap_err();
        assert!(err.to_string().contains("either"));
    }

    #[test]
    fn test_FA001_script_without_interpreter_rejected() {
        let yaml = r#"
name: greet
run:
  script: echo hi
"#;
        let err = load(yaml).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn test_FA001_unterminated_interpreter_rejected_at_load() {
        let yaml = r#"
name: greet
run:
  interpreter: "sh 'unterminated"
  script: echo hi
"#;
        let err = load(yaml).unwrap_err();
        assert!(err.to_string().contains("run.interpreter"));
    }

    #[test]
    fn test_FA001_env_list_form() {
        let yaml = r#"
name: greet
env:
  - NAME
  - LOUD
run:
  command: echo hi
"#;
        let task = load(yaml).unwrap();
        assert_eq!(task.env.len(), 2);
        assert_eq!(task.env["NAME"], "N/A");
        assert_eq!(task.env["LOUD"], "N/A");
    }

    #[test]
    fn test_FA001_env_list_rejects_non_strings() {
        let yaml = r#"
name: greet
env:
  - NAME
  - 42
run:
  command: echo hi
"#;
        let err = load(yaml).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn test_FA001_unknown_run_key_rejected() {
        let yaml = r#"
name: greet
run:
  command: echo hi
  shell: bash
"#;
        let err = load(yaml).unwrap_err();
        assert!(err.to_string().contains("shell"));
    }

    #[test]
    fn test_FA001_tasks_equal_apart_from_path() {
        let yaml = r#"
name: greet
env:
  NAME: who to greet
run:
  command: echo hi
"#;
        let a = Task::from_yaml(yaml, Path::new("/a/manifest.yml"), Path::new("/a")).unwrap();
        let b = Task::from_yaml(yaml, Path::new("/b/manifest.yml"), Path::new("/b")).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(a.name, b.name);
        assert_eq!(a.description, b.description);
        assert_eq!(a.env, b.env);
        assert_eq!(a.run, b.run);
    }
}
