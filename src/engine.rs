//! Job execution facade (FA-005).
//!
//! Orchestrates a run end to end: load the job manifest, discover tasks,
//! bind every command, then either stop (dry run) or hand the bound
//! commands to the executor. Binding always runs in full, so a dry run is
//! exactly "load + discover + bind".

use crate::binder;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, JobStatus};
use crate::executor::{self, RunOutcome};
use crate::manifest::Job;
use crate::registry::TaskRegistry;
use crate::shutdown::Shutdown;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Load, discover and bind, but spawn nothing.
    pub dry_run: bool,

    /// Restrict execution to these command names; everything else is
    /// reported as skipped.
    pub command_filter: Option<Vec<String>>,
}

/// Execute the job described by the manifest at `path`.
pub async fn execute_job(
    path: &Path,
    options: &ExecuteOptions,
    sink: &mut dyn EventSink,
    shutdown: &mut Shutdown,
) -> Result<RunOutcome, EngineError> {
    info!("loading job manifest at {}", path.display());
    let job = Job::from_file(path)?;
    sink.emit(&EngineEvent::JobStart {
        name: job.name.clone(),
    });

    if job.tasks.is_empty() {
        warn!("the job manifest defines no `tasks` paths, no tasks will be available");
    }
    let registry = TaskRegistry::discover(&job.tasks)?;
    sink.emit(&EngineEvent::TasksDiscovered {
        names: registry.names(),
    });

    let bound = binder::bind(&job, &registry)?;

    if let Some(filter) = &options.command_filter {
        for name in filter {
            if !job.commands.iter().any(|c| c.name.as_ref() == Some(name)) {
                warn!("the command filter names `{name}`, which is not a command in this job");
            }
        }
    }

    if options.dry_run {
        info!("dry run: {} commands bound, nothing executed", bound.len());
        if let Ok(dump) = serde_yaml::to_string(&job) {
            info!("manifest parsed as:");
            for line in dump.trim_end().lines() {
                info!("  {line}");
            }
        }
        sink.emit(&EngineEvent::JobEnd {
            status: JobStatus::Success,
        });
        return Ok(RunOutcome::default());
    }

    if !job.data.is_dir() {
        return Err(EngineError::PathError {
            path: job.data.clone(),
            message: "the job's `data` directory does not exist".to_string(),
        });
    }

    let result = executor::run_commands(
        &job,
        &bound,
        options.command_filter.as_deref(),
        sink,
        shutdown,
    )
    .await;

    let status = match &result {
        Ok(_) => JobStatus::Success,
        Err(EngineError::Interrupted { .. }) => JobStatus::Interrupted,
        Err(_) => JobStatus::Failed,
    };
    sink.emit(&EngineEvent::JobEnd { status });
    result
}
