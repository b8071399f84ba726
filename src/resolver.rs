//! Placeholder resolution for command env values (FA-003).
//!
//! A placeholder is `${ expr }` where `expr` is a dotted path of
//! identifiers. The first segment selects the scope; there is no
//! fallthrough. `$$` produces a literal `$`; everything outside a
//! placeholder is copied verbatim. Values are resolved immediately before
//! a command spawns, against the results of the commands that have already
//! executed, which is what makes backward references work and forward
//! references diagnosable.

use crate::error::EngineError;
use crate::manifest::Job;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Terminal state of an executed command, published into the scope as
/// `previous` and (when named) `commands.<name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub name: Option<String>,
    pub task: String,
    pub returncode: i32,
    /// The resolved env snapshot: literal values only.
    pub env: IndexMap<String, String>,
}

/// Lookup table over a job's static fields and the results accumulated
/// during execution. Mutated only between commands.
#[derive(Debug)]
pub struct Scope<'j> {
    job: &'j Job,
    host: IndexMap<String, String>,
    previous: Option<CommandResult>,
    named: IndexMap<String, CommandResult>,
    declared_names: HashSet<String>,
}

impl<'j> Scope<'j> {
    pub fn new(job: &'j Job) -> Self {
        Self::with_host_env(job, std::env::vars().collect())
    }

    /// Like [`Scope::new`] with an explicit host environment snapshot.
    pub fn with_host_env(job: &'j Job, host: IndexMap<String, String>) -> Self {
        let declared_names = job
            .commands
            .iter()
            .filter_map(|c| c.name.clone())
            .collect();
        Self {
            job,
            host,
            previous: None,
            named: IndexMap::new(),
            declared_names,
        }
    }

    /// Record an executed command's result. Skipped commands are never
    /// published, so `previous` always points at a real execution.
    pub fn publish(&mut self, result: CommandResult) {
        if let Some(name) = &result.name {
            self.named.insert(name.clone(), result.clone());
        }
        self.previous = Some(result);
    }

    pub fn previous(&self) -> Option<&CommandResult> {
        self.previous.as_ref()
    }
}

/// Per-run allocator backing the `tmp` scope. Directories live under
/// `<job.data>/tmp/<run-id>/` and are removed only on clean shutdown.
#[derive(Debug)]
pub struct TmpAllocator {
    root: PathBuf,
    created: bool,
}

impl TmpAllocator {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("tmp").join(run_id()),
            created: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh directory for `label` within command `index`. The
    /// per-command cache in [`CommandScope`] guarantees this is called at
    /// most once per (command, label) pair.
    fn allocate(&mut self, index: usize, label: &str) -> std::io::Result<PathBuf> {
        if !self.created {
            std::fs::create_dir_all(&self.root)?;
            self.created = true;
        }
        let dir = self.root.join(format!("c{:02}-{label}", index + 1));
        std::fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Remove the run root. Called on clean shutdown only; failures and
    /// interrupts leave the directories in place for inspection.
    pub fn cleanup(self) -> std::io::Result<()> {
        if self.created {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Unique per allocator, even within one process: wall-clock seconds and
/// pid distinguish runs across processes, the counter distinguishes
/// allocators created in the same second (tests do this constantly).
fn run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicU32 = AtomicU32::new(0);
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("run-{secs:x}-{}-{seq}", std::process::id())
}

/// Resolution context for a single command: the shared scope plus this
/// command's `tmp` label cache.
pub struct CommandScope<'a, 'j> {
    scope: &'a Scope<'j>,
    tmp: &'a mut TmpAllocator,
    index: usize,
    labels: IndexMap<String, PathBuf>,
}

impl<'a, 'j> CommandScope<'a, 'j> {
    pub fn new(scope: &'a Scope<'j>, tmp: &'a mut TmpAllocator, index: usize) -> Self {
        Self {
            scope,
            tmp,
            index,
            labels: IndexMap::new(),
        }
    }

    /// Resolve every value of an env mapping, preserving key order.
    pub fn resolve_env(
        &mut self,
        env: &IndexMap<String, String>,
    ) -> Result<IndexMap<String, String>, EngineError> {
        let mut resolved = IndexMap::with_capacity(env.len());
        for (key, value) in env {
            resolved.insert(key.clone(), self.resolve(value)?);
        }
        Ok(resolved)
    }

    /// Resolve one string value to a literal. UTF-8-safe scan; resolved
    /// text is never re-scanned.
    pub fn resolve(&mut self, value: &str) -> Result<String, EngineError> {
        let mut out = String::with_capacity(value.len());
        let mut pos = 0;
        while pos < value.len() {
            let rest = &value[pos..];
            if rest.starts_with("$$") {
                out.push('$');
                pos += 2;
            } else if rest.starts_with("${") {
                let close = rest.find('}').ok_or_else(|| EngineError::PlaceholderSyntax {
                    value: value.to_string(),
                    offset: pos,
                    message: "unclosed placeholder".to_string(),
                })?;
                let expression = &rest[..close + 1];
                let segments =
                    lex_expression(&rest[2..close]).map_err(|message| {
                        EngineError::PlaceholderSyntax {
                            value: value.to_string(),
                            offset: pos,
                            message,
                        }
                    })?;
                let resolved = self.lookup(&segments, expression, value)?;
                out.push_str(&resolved);
                pos += close + 1;
            } else {
                let ch = rest.chars().next().unwrap();
                out.push(ch);
                pos += ch.len_utf8();
            }
        }
        Ok(out)
    }

    fn lookup(
        &mut self,
        segments: &[String],
        expression: &str,
        value: &str,
    ) -> Result<String, EngineError> {
        let fail = |message: String| EngineError::PlaceholderReference {
            expression: expression.to_string(),
            value: value.to_string(),
            message,
        };

        match segments[0].as_str() {
            "job" => self.lookup_job(&segments[1..]).map_err(fail),
            "previous" => {
                let previous = self
                    .scope
                    .previous()
                    .ok_or_else(|| fail("no command has executed yet".to_string()))?;
                command_field(previous, &segments[1..]).map_err(fail)
            }
            "commands" => {
                let Some(name) = segments.get(1) else {
                    return Err(fail(
                        "`commands` must be followed by a command name".to_string(),
                    ));
                };
                match self.scope.named.get(name) {
                    Some(result) => command_field(result, &segments[2..]).map_err(fail),
                    None if self.scope.declared_names.contains(name) => Err(fail(format!(
                        "command `{name}` has not completed; only earlier, executed commands can be referenced"
                    ))),
                    None => {
                        let mut known: Vec<&String> = self.scope.named.keys().collect();
                        known.sort();
                        Err(fail(format!(
                            "unknown command `{name}`, completed commands: {}",
                            if known.is_empty() {
                                "(none)".to_string()
                            } else {
                                known
                                    .iter()
                                    .map(|s| s.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            }
                        )))
                    }
                }
            }
            "env" => match segments {
                [_, key] => self
                    .scope
                    .host
                    .get(key)
                    .cloned()
                    .ok_or_else(|| fail(format!("host environment variable `{key}` is not set"))),
                [_] => Err(fail("`env` must be followed by a variable name".to_string())),
                _ => Err(fail("`env` takes a single variable name".to_string())),
            },
            "tmp" => match segments {
                [_, label] => self.tmp_dir(label).map_err(|e| {
                    fail(format!("failed to allocate tmp directory `{label}`: {e}"))
                }),
                [_] => Err(fail("`tmp` must be followed by a label".to_string())),
                _ => Err(fail("`tmp` takes a single label".to_string())),
            },
            other => Err(fail(format!(
                "unknown scope `{other}`; the first segment must be one of: job, previous, commands, env, tmp"
            ))),
        }
    }

    fn lookup_job(&self, rest: &[String]) -> Result<String, String> {
        match rest {
            [field] => match field.as_str() {
                "name" => Ok(self.scope.job.name.clone()),
                "description" => self
                    .scope
                    .job
                    .description
                    .clone()
                    .ok_or_else(|| "job has no description".to_string()),
                "data" => Ok(self.scope.job.data.display().to_string()),
                "env" => Err("`job.env` must be followed by a key".to_string()),
                other => Err(format!(
                    "unknown job field `{other}`; expected one of: name, description, data, env"
                )),
            },
            [field, key] if field == "env" => self
                .scope
                .job
                .env
                .get(key)
                .cloned()
                .ok_or_else(|| format!("job env has no key `{key}`")),
            [] => Err("`job` must be followed by a field".to_string()),
            _ => Err("too many segments for a job reference".to_string()),
        }
    }

    /// `${tmp.<label>}`: one fresh directory per label per command,
    /// created before the child spawns.
    fn tmp_dir(&mut self, label: &str) -> std::io::Result<String> {
        if let Some(dir) = self.labels.get(label) {
            return Ok(dir.display().to_string());
        }
        let dir = self.tmp.allocate(self.index, label)?;
        self.labels.insert(label.to_string(), dir.clone());
        Ok(dir.display().to_string())
    }
}

fn command_field(result: &CommandResult, rest: &[String]) -> Result<String, String> {
    match rest {
        [field] => match field.as_str() {
            "name" => result
                .name
                .clone()
                .ok_or_else(|| "the referenced command has no name".to_string()),
            "task" => Ok(result.task.clone()),
            "returncode" => Ok(result.returncode.to_string()),
            "env" => Err("`env` must be followed by a key".to_string()),
            other => Err(format!(
                "unknown command field `{other}`; expected one of: name, task, returncode, env"
            )),
        },
        [field, key] if field == "env" => result.env.get(key).cloned().ok_or_else(|| {
            let mut keys: Vec<&String> = result.env.keys().collect();
            keys.sort();
            format!(
                "no env key `{key}`; the command supplied: {}",
                if keys.is_empty() {
                    "(none)".to_string()
                } else {
                    keys.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                }
            )
        }),
        [] => Err("a command reference must name a field".to_string()),
        _ => Err("too many segments for a command reference".to_string()),
    }
}

/// Split the text between braces into path segments, ignoring whitespace
/// around segments and dots.
fn lex_expression(raw: &str) -> Result<Vec<String>, String> {
    let mut segments = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut segment = String::new();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => segment.push(c),
            Some(c) => {
                return Err(format!(
                    "unexpected character `{c}` at the start of a segment"
                ))
            }
            None if segments.is_empty() => return Err("empty placeholder expression".to_string()),
            None => return Err("expected a segment after `.`".to_string()),
        }
        while let Some(c) =
            chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        {
            segment.push(c);
        }
        segments.push(segment);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => return Ok(segments),
            Some('.') => continue,
            Some(c) => return Err(format!("unexpected character `{c}` after a segment")),
        }
    }
}
