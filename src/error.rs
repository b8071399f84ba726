//! Engine error kinds.
//!
//! Every failure mode of a job run maps to one variant here. Errors are
//! single-shot: nothing is retried, and everything except `CommandFailed`
//! and `Interrupted` is raised before any child process has been spawned.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The document is not parseable YAML (or not a mapping at the root).
    #[error("failed to parse manifest at {}: {message}", path.display())]
    MalformedManifest { path: PathBuf, message: String },

    /// The document parsed but does not match the schema: unknown field,
    /// missing field, wrong scalar type, or a structural constraint.
    #[error("invalid manifest at {}: {message}", path.display())]
    SchemaViolation { path: PathBuf, message: String },

    /// A required path does not exist or is not a directory.
    #[error("{message}: {}", path.display())]
    PathError { path: PathBuf, message: String },

    #[error("duplicate task name `{name}` declared at {} and {}", first.display(), second.display())]
    DuplicateTaskName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("unknown task `{task}` in command {command}, available tasks: {}", display_list(available))]
    UnknownTask {
        command: String,
        task: String,
        available: Vec<String>,
    },

    #[error("command {command} is missing env keys declared by task `{task}`: {}", display_list(keys))]
    MissingEnv {
        command: String,
        task: String,
        keys: Vec<String>,
    },

    #[error("command {command} supplies env keys not declared by task `{task}`: {}", display_list(keys))]
    UnexpectedEnv {
        command: String,
        task: String,
        keys: Vec<String>,
    },

    /// Aggregate of all binder diagnostics for a job. Execution never
    /// starts while any command fails to bind.
    #[error("command binding failed:\n{}", bullet_list(errors))]
    Binding { errors: Vec<EngineError> },

    /// A `${...}` expression is malformed. `offset` is the byte position
    /// of the `$` within the value being resolved.
    #[error("invalid placeholder in `{value}` at offset {offset}: {message}")]
    PlaceholderSyntax {
        value: String,
        offset: usize,
        message: String,
    },

    /// A well-formed placeholder references something that cannot be
    /// resolved in the current scope.
    #[error("cannot resolve `{expression}` in `{value}`: {message}")]
    PlaceholderReference {
        expression: String,
        value: String,
        message: String,
    },

    /// A child process exited non-zero. `index` is zero-based.
    #[error("command #{}{} exited with code {exit_code}", index + 1, name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default())]
    CommandFailed {
        index: usize,
        name: Option<String>,
        exit_code: i32,
    },

    /// The engine received a termination signal mid-run.
    #[error("interrupted by signal {signal}")]
    Interrupted { signal: i32 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The process exit code this error maps to. Engine-level failures are
    /// 1; a failed command propagates the child's code, capped at 125.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::CommandFailed { exit_code, .. } => (*exit_code).clamp(1, 125) as u8,
            _ => 1,
        }
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn bullet_list(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn test_FA007_command_failed_display_with_name() {
        let err = EngineError::CommandFailed {
            index: 2,
            name: Some("fetch".to_string()),
            exit_code: 3,
        };
        assert_eq!(err.to_string(), "command #3 (fetch) exited with code 3");
    }

    #[test]
    fn test_FA007_command_failed_display_unnamed() {
        let err = EngineError::CommandFailed {
            index: 0,
            name: None,
            exit_code: 1,
        };
        assert_eq!(err.to_string(), "command #1 exited with code 1");
    }

    #[test]
    fn test_FA007_exit_code_capped_at_125() {
        let err = EngineError::CommandFailed {
            index: 0,
            name: None,
            exit_code: 143,
        };
        assert_eq!(err.exit_code(), 125);
    }

    #[test]
    fn test_FA007_exit_code_passthrough() {
        let err = EngineError::CommandFailed {
            index: 0,
            name: None,
            exit_code: 2,
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_FA007_engine_failures_exit_one() {
        let err = EngineError::Interrupted { signal: 15 };
        assert_eq!(err.exit_code(), 1);
        let err = EngineError::PathError {
            path: PathBuf::from("/nope"),
            message: "missing".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_FA007_binding_display_bullets() {
        let err = EngineError::Binding {
            errors: vec![
                EngineError::MissingEnv {
                    command: "#1".to_string(),
                    task: "t".to_string(),
                    keys: vec!["B".to_string()],
                },
                EngineError::UnexpectedEnv {
                    command: "#1".to_string(),
                    task: "t".to_string(),
                    keys: vec!["C".to_string()],
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("missing env keys"));
        assert!(text.contains("B"));
        assert!(text.contains("not declared"));
        assert!(text.contains("C"));
    }
}
