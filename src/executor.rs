//! Sequential command executor (FA-005).
//!
//! Runs bound commands in order. For each command: resolve env values
//! against the current scope, spawn the child with the resolved env
//! overlaid on the host environment, stream both stdio pipes line-by-line
//! into the sink, then publish the result so later commands can reference
//! it. The first non-zero exit halts the run. A termination signal is
//! forwarded to the live child, which is then awaited under a short grace
//! window.

use crate::binder::BoundCommand;
use crate::error::EngineError;
use crate::events::{CommandRecord, EngineEvent, EventSink, OutputStream};
use crate::manifest::Job;
use crate::resolver::{CommandResult, CommandScope, Scope, TmpAllocator};
use crate::shutdown::Shutdown;
use chrono::Utc;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as ChildCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long a signalled child gets to exit before it is killed.
const GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub executed: usize,
    pub skipped: usize,
}

/// Run the job's commands in order. `filter`, when present, restricts
/// execution to the named commands; everything else is reported as
/// skipped. Skipped commands never become `previous`.
pub async fn run_commands(
    job: &Job,
    bound: &[BoundCommand<'_>],
    filter: Option<&[String]>,
    sink: &mut dyn EventSink,
    shutdown: &mut Shutdown,
) -> Result<RunOutcome, EngineError> {
    let total = bound.len();
    let mut scope = Scope::new(job);
    let mut tmp = TmpAllocator::new(&job.data);
    let mut outcome = RunOutcome::default();

    for bc in bound {
        if let Some(signal) = shutdown.pending() {
            return Err(EngineError::Interrupted { signal });
        }

        if !selected(bc, filter) || bc.command.skip {
            sink.emit(&EngineEvent::CommandSkipped {
                index: bc.index,
                total,
                name: bc.command.name.clone(),
            });
            outcome.skipped += 1;
            continue;
        }

        let mut command_scope = CommandScope::new(&scope, &mut tmp, bc.index);
        let env = command_scope.resolve_env(&bc.command.env)?;

        sink.emit(&EngineEvent::CommandStart {
            index: bc.index,
            total,
            record: CommandRecord {
                name: bc.command.name.clone(),
                task: bc.task.name.clone(),
                description: bc.command.description.clone(),
                env: env.clone(),
            },
        });

        let exit_code = spawn_and_stream(bc, &env, &job.data, sink, shutdown).await?;
        sink.emit(&EngineEvent::CommandEnd { exit_code });
        outcome.executed += 1;

        scope.publish(CommandResult {
            name: bc.command.name.clone(),
            task: bc.task.name.clone(),
            returncode: exit_code,
            env,
        });

        if exit_code != 0 {
            return Err(EngineError::CommandFailed {
                index: bc.index,
                name: bc.command.name.clone(),
                exit_code,
            });
        }
    }

    if let Err(e) = tmp.cleanup() {
        warn!("failed to remove tmp directories: {e}");
    }
    Ok(outcome)
}

fn selected(bc: &BoundCommand<'_>, filter: Option<&[String]>) -> bool {
    match filter {
        None => true,
        Some(names) => bc
            .command
            .name
            .as_ref()
            .is_some_and(|name| names.contains(name)),
    }
}

async fn spawn_and_stream(
    bc: &BoundCommand<'_>,
    env: &indexmap::IndexMap<String, String>,
    cwd: &Path,
    sink: &mut dyn EventSink,
    shutdown: &mut Shutdown,
) -> Result<i32, EngineError> {
    let argv = bc.task.run.argv().map_err(|e| EngineError::SchemaViolation {
        path: bc.task.path.join("manifest.yml"),
        message: format!("invalid run.interpreter: {e}"),
    })?;
    debug!("spawning {:?} in {}", argv, cwd.display());

    let mut child = ChildCommand::new(&argv[0])
        .args(&argv[1..])
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::io(format!("failed to spawn `{}`", argv[0]), e))?;

    let stdout = child.stdout.take().ok_or_else(|| {
        EngineError::io(
            "child stdout not captured".to_string(),
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        )
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        EngineError::io(
            "child stderr not captured".to_string(),
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        )
    })?;

    let (tx, mut rx) = mpsc::channel::<(OutputStream, String)>(64);
    tokio::spawn(forward_lines(stdout, OutputStream::Stdout, tx.clone()));
    tokio::spawn(forward_lines(stderr, OutputStream::Stderr, tx));

    let pid = child.id();
    let mut exit = None;
    let mut signalled = None;

    // Drain lines until both pipes close; the child usually exits first.
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some((stream, text)) => sink.emit(&EngineEvent::OutputLine {
                    stream,
                    ts: Utc::now(),
                    text,
                }),
                None => break,
            },
            status = child.wait(), if exit.is_none() => {
                exit = Some(status.map_err(|e| EngineError::io("waiting for child", e))?);
            }
            signal = shutdown.recv(), if signalled.is_none() && exit.is_none() => {
                signalled = Some(signal);
                forward_signal(pid, signal);
            }
        }
    }

    let status = match exit {
        Some(status) => status,
        None if signalled.is_some() => match tokio::time::timeout(GRACE, child.wait()).await {
            Ok(status) => status.map_err(|e| EngineError::io("waiting for child", e))?,
            Err(_) => {
                warn!("child did not exit within the grace window, killing it");
                child
                    .kill()
                    .await
                    .map_err(|e| EngineError::io("killing child", e))?;
                child
                    .wait()
                    .await
                    .map_err(|e| EngineError::io("waiting for child", e))?
            }
        },
        None => child
            .wait()
            .await
            .map_err(|e| EngineError::io("waiting for child", e))?,
    };

    let exit_code = exit_code(&status);
    if let Some(signal) = signalled {
        sink.emit(&EngineEvent::CommandEnd { exit_code });
        return Err(EngineError::Interrupted { signal });
    }
    Ok(exit_code)
}

async fn forward_lines(
    reader: impl AsyncRead + Unpin,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, String)>,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send((stream, line)).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, signal: i32) {
    if let Some(pid) = pid {
        // SAFETY: pid was just obtained from our own child handle
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}

#[cfg(not(unix))]
fn forward_signal(_pid: Option<u32>, _signal: i32) {}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
