//! Engine event stream (FA-005).
//!
//! The executor narrates a run as a sequence of events; consumers implement
//! [`EventSink`] to render or record them. The engine guarantees that every
//! output line of a command is delivered before its `CommandEnd`, and that
//! `CommandEnd` precedes the next command's banner.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Interrupted,
}

/// A command as it is about to run: task, description and the fully
/// resolved env snapshot (literals only).
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub env: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    JobStart {
        name: String,
    },
    TasksDiscovered {
        names: Vec<String>,
    },
    CommandStart {
        index: usize,
        total: usize,
        record: CommandRecord,
    },
    CommandSkipped {
        index: usize,
        total: usize,
        name: Option<String>,
    },
    OutputLine {
        stream: OutputStream,
        ts: DateTime<Utc>,
        text: String,
    },
    CommandEnd {
        exit_code: i32,
    },
    JobEnd {
        status: JobStatus,
    },
}

pub trait EventSink: Send {
    fn emit(&mut self, event: &EngineEvent);
}

/// Collects events in memory. Used by tests and embedders that want to
/// inspect a run after the fact.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<EngineEvent>,
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &EngineEvent) {
        self.events.push(event.clone());
    }
}

/// Fans events out to several sinks in order.
pub struct MultiSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for MultiSink {
    fn emit(&mut self, event: &EngineEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }
}

#[derive(Serialize)]
struct TimestampedEvent<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a EngineEvent,
}

/// Appends each event as one JSON line. Write failures are logged and
/// dropped; the event log never takes a run down.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &EngineEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(&TimestampedEvent {
            ts: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            event,
        })?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: &EngineEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!("failed to append event to {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn test_FA005_event_serialization_is_tagged() {
        let event = EngineEvent::CommandEnd { exit_code: 2 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"command_end\""));
        assert!(json.contains("\"exit_code\":2"));
    }

    #[test]
    fn test_FA005_command_start_carries_resolved_record() {
        let event = EngineEvent::CommandStart {
            index: 0,
            total: 2,
            record: CommandRecord {
                name: Some("fetch".to_string()),
                task: "download".to_string(),
                description: None,
                env: IndexMap::from([("OUT".to_string(), "/tmp/a".to_string())]),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"task\":\"download\""));
        assert!(json.contains("\"OUT\":\"/tmp/a\""));
        // absent description is omitted entirely
        assert!(!json.contains("description"));
    }

    #[test]
    fn test_FA005_output_stream_snake_case() {
        assert_eq!(
            serde_json::to_string(&OutputStream::Stderr).unwrap(),
            "\"stderr\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Interrupted).unwrap(),
            "\"interrupted\""
        );
    }

    #[test]
    fn test_FA005_memory_sink_collects() {
        let mut sink = MemorySink::default();
        sink.emit(&EngineEvent::JobStart {
            name: "etl".to_string(),
        });
        sink.emit(&EngineEvent::JobEnd {
            status: JobStatus::Success,
        });
        assert_eq!(sink.events.len(), 2);
    }

    #[test]
    fn test_FA005_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.events.jsonl");
        let mut sink = JsonlSink::new(&path);
        sink.emit(&EngineEvent::JobStart {
            name: "etl".to_string(),
        });
        sink.emit(&EngineEvent::CommandEnd { exit_code: 0 });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "job_start");
        assert!(first["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_FA005_multi_sink_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.events.jsonl");
        let mut sink = MultiSink::new(vec![
            Box::new(MemorySink::default()),
            Box::new(JsonlSink::new(&path)),
        ]);
        sink.emit(&EngineEvent::CommandEnd { exit_code: 0 });
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
