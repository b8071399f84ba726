//! Manifest model and loader (FA-001).
//!
//! YAML documents are parsed in two stages: text to `serde_yaml::Value`
//! (failures are `MalformedManifest`), then `Value` to the typed model with
//! unknown fields rejected (failures are `SchemaViolation`). Env values are
//! kept verbatim, placeholders included; nothing is resolved at load time.

mod env;
mod job;
mod task;

pub use job::{Command, Job};
pub use task::{Run, Task};

use crate::error::EngineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Read a manifest file, returning its content and absolute path.
pub(crate) fn read_manifest(path: &Path) -> Result<(String, PathBuf), EngineError> {
    let abs = std::path::absolute(path)
        .map_err(|e| EngineError::io(format!("resolving manifest path {}", path.display()), e))?;
    let text = std::fs::read_to_string(&abs).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EngineError::PathError {
            path: abs.clone(),
            message: "manifest file does not exist".to_string(),
        },
        _ => EngineError::io(format!("reading manifest at {}", abs.display()), e),
    })?;
    Ok((text, abs))
}

/// Parse a manifest document to a YAML value, requiring a mapping root.
pub(crate) fn parse_document(text: &str, path: &Path) -> Result<serde_yaml::Value, EngineError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| EngineError::MalformedManifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if !value.is_mapping() {
        return Err(EngineError::MalformedManifest {
            path: path.to_path_buf(),
            message: "expected a mapping at the document root".to_string(),
        });
    }
    Ok(value)
}

pub(crate) fn schema_error(path: &Path, message: impl Into<String>) -> EngineError {
    EngineError::SchemaViolation {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Identifiers name jobs, commands and tasks, and must be referencable
/// from placeholder expressions.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
