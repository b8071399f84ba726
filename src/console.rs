//! Terminal renderer for engine events.
//!
//! Thin by design: the engine only depends on the `EventSink` interface.

use crate::events::{EngineEvent, EventSink, JobStatus, OutputStream};
use chrono::Local;
use colored::Colorize;

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::JobStart { name } => {
                println!(
                    "{}{}{}",
                    "━╸".blue(),
                    format!("Executing job: {name}").bright_white().bold(),
                    "╺━".blue()
                );
            }
            EngineEvent::TasksDiscovered { names } => {
                if names.is_empty() {
                    println!("{}", "No tasks discovered".yellow());
                } else {
                    println!("Available tasks:");
                    for name in names {
                        println!(" - {name}");
                    }
                }
            }
            EngineEvent::CommandStart {
                index,
                total,
                record,
            } => {
                let title = match &record.name {
                    Some(name) => {
                        format!("Command: {name} ({} of {total})", index + 1)
                    }
                    None => format!("Command {} of {total}", index + 1),
                };
                println!();
                println!(
                    "{}{}{}",
                    "═╴".blue(),
                    title.bright_white().bold(),
                    "╶═".blue()
                );
                println!("  task: {}", record.task);
                if let Some(description) = &record.description {
                    println!("  description: {description}");
                }
                if !record.env.is_empty() {
                    println!("  env:");
                    for (key, value) in &record.env {
                        println!("    {key}: {value}");
                    }
                }
            }
            EngineEvent::CommandSkipped { index, total, name } => {
                let label = name
                    .clone()
                    .unwrap_or_else(|| format!("#{}", index + 1));
                println!(
                    "{}",
                    format!("Skipping command {label} ({} of {total})", index + 1).yellow()
                );
            }
            EngineEvent::OutputLine { stream, ts, text } => {
                let stamp = ts
                    .with_timezone(&Local)
                    .format("%H:%M:%S%.3f")
                    .to_string();
                let line = match stream {
                    OutputStream::Stdout => text.normal(),
                    OutputStream::Stderr => text.red(),
                };
                println!("{}{} {line}", stamp.dimmed(), "┊".blue());
            }
            EngineEvent::CommandEnd { exit_code } => {
                let footer = format!("Return code: {exit_code}");
                let footer = if *exit_code == 0 {
                    footer.normal()
                } else {
                    footer.red()
                };
                println!("{}{footer}{}", "─╴".blue(), "╶─".blue());
            }
            EngineEvent::JobEnd { status } => {
                println!();
                match status {
                    JobStatus::Success => println!("{}", "Done! \\o/".bright_white().bold()),
                    JobStatus::Failed => println!("{}", "Job failed.".red().bold()),
                    JobStatus::Interrupted => {
                        println!("{}", "Job interrupted.".yellow().bold())
                    }
                }
            }
        }
    }
}
