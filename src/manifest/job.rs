//! Job and command models (FA-001).

use super::env;
use super::{is_identifier, parse_document, read_manifest, schema_error};
use crate::error::EngineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// An ordered, named pipeline of commands. Immutable once loaded; all run
/// state lives with the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Root directory for the job's data, exposed as `${job.data}` and used
    /// as the working directory of every child process. Defaults to the
    /// directory containing the manifest.
    pub data: PathBuf,

    /// Task search roots, walked by the registry. Absolute after base-dir
    /// expansion.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<PathBuf>,

    /// Job-level values, reachable from commands as `${job.env.KEY}`. Kept
    /// literal; never injected into a child's environment.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    pub commands: Vec<Command>,
}

/// One scheduled invocation of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the task to execute; matched against the registry exactly.
    pub task: String,

    /// Values for the task's declared variables. May contain placeholders;
    /// resolved immediately before the command spawns.
    #[serde(default, deserialize_with = "env::env_map")]
    pub env: IndexMap<String, String>,

    /// Skipped commands are never spawned and never become `previous`,
    /// but they are still bound and validated.
    #[serde(default)]
    pub skip: bool,
}

impl Command {
    /// Human-readable handle for diagnostics: the name, or `#N`.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("#{}", index + 1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobDoc {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, deserialize_with = "env::one_or_many")]
    tasks: Vec<String>,
    #[serde(default, deserialize_with = "env::env_map")]
    env: IndexMap<String, String>,
    #[serde(default)]
    commands: Vec<Command>,
}

impl Job {
    pub fn from_file(path: &Path) -> Result<Job, EngineError> {
        let (text, abs) = read_manifest(path)?;
        let base = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::from_yaml(&text, &abs, &base)
    }

    /// Parse a job manifest from YAML text. `origin` names the document in
    /// diagnostics; `base` anchors relative paths.
    pub fn from_yaml(text: &str, origin: &Path, base: &Path) -> Result<Job, EngineError> {
        let value = parse_document(text, origin)?;
        let doc: JobDoc =
            serde_yaml::from_value(value).map_err(|e| schema_error(origin, e.to_string()))?;

        if !is_identifier(&doc.name) {
            return Err(schema_error(
                origin,
                format!("job name `{}` is not a valid identifier", doc.name),
            ));
        }
        if doc.commands.is_empty() {
            return Err(schema_error(origin, "job must define at least one command"));
        }

        let mut seen = HashSet::new();
        for (index, command) in doc.commands.iter().enumerate() {
            if let Some(name) = &command.name {
                if !is_identifier(name) {
                    return Err(schema_error(
                        origin,
                        format!("command name `{name}` is not a valid identifier"),
                    ));
                }
                if !seen.insert(name.clone()) {
                    return Err(schema_error(
                        origin,
                        format!("duplicate command name `{name}`"),
                    ));
                }
            }
            if command.task.is_empty() {
                return Err(schema_error(
                    origin,
                    format!("command {} has an empty task name", command.label(index)),
                ));
            }
        }

        let data = match &doc.data {
            Some(raw) => env::expand_path(raw, base),
            None => base.to_path_buf(),
        };
        let tasks = doc
            .tasks
            .iter()
            .map(|raw| env::expand_path(raw, base))
            .collect();

        Ok(Job {
            name: doc.name,
            description: doc.description,
            data,
            tasks,
            env: doc.env,
            commands: doc.commands,
        })
    }
}
