//! Command binding and env validation (FA-004).
//!
//! Before anything runs, every command is matched to its task and its env
//! keys are checked against the task's declaration. The check is exact:
//! a missing declared key and a supplied undeclared key are both fatal.
//! All commands are validated, skipped ones included, and every violation
//! is collected so one run reports the whole picture.

use crate::error::EngineError;
use crate::manifest::{Command, Job, Task};
use crate::registry::TaskRegistry;

/// A command with its task attached, ready for execution.
#[derive(Debug)]
pub struct BoundCommand<'j> {
    pub index: usize,
    pub command: &'j Command,
    pub task: &'j Task,
}

/// Bind every command in order. Returns all binder diagnostics at once;
/// execution never starts with a partially bound job.
pub fn bind<'j>(
    job: &'j Job,
    registry: &'j TaskRegistry,
) -> Result<Vec<BoundCommand<'j>>, EngineError> {
    let mut bound = Vec::with_capacity(job.commands.len());
    let mut errors = Vec::new();

    for (index, command) in job.commands.iter().enumerate() {
        let label = command.label(index);
        let Some(task) = registry.get(&command.task) else {
            errors.push(EngineError::UnknownTask {
                command: label,
                task: command.task.clone(),
                available: registry.names(),
            });
            continue;
        };

        let missing: Vec<String> = task
            .env
            .keys()
            .filter(|key| !command.env.contains_key(*key))
            .cloned()
            .collect();
        let unexpected: Vec<String> = command
            .env
            .keys()
            .filter(|key| !task.env.contains_key(*key))
            .cloned()
            .collect();

        if !missing.is_empty() {
            errors.push(EngineError::MissingEnv {
                command: label.clone(),
                task: task.name.clone(),
                keys: missing,
            });
        }
        if !unexpected.is_empty() {
            errors.push(EngineError::UnexpectedEnv {
                command: label,
                task: task.name.clone(),
                keys: unexpected,
            });
        }

        bound.push(BoundCommand {
            index,
            command,
            task,
        });
    }

    if errors.is_empty() {
        Ok(bound)
    } else {
        Err(EngineError::Binding { errors })
    }
}
