//! faena — sequential job orchestration over declarative task manifests.
//!
//! A job manifest lists commands; each command invokes a named task with
//! values for the env variables the task declares. The engine discovers
//! task manifests on disk, validates that every command supplies exactly
//! the declared variables, resolves `${...}` placeholders between
//! commands, and runs each command as a child process, streaming its
//! output through a structured event sink.

pub mod binder;
pub mod console;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod shellwords;
pub mod shutdown;

pub use engine::{execute_job, ExecuteOptions};
pub use error::EngineError;
pub use events::{EngineEvent, EventSink, JobStatus, MemorySink, OutputStream};
pub use executor::RunOutcome;
pub use manifest::{Command, Job, Run, Task};
pub use registry::TaskRegistry;
pub use shutdown::Shutdown;
