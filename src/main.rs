use clap::Parser;
use colored::Colorize;
use faena::console::ConsoleSink;
use faena::events::{EventSink, JsonlSink, MultiSink};
use faena::{execute_job, ExecuteOptions, Shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "faena")]
#[command(version, about = "Sequential job orchestration over declarative task manifests", long_about = None)]
struct Cli {
    /// Path to the job manifest YAML file
    manifest: PathBuf,

    /// Load, discover and bind without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated command names to execute; commands run in job
    /// order regardless of the order given here
    #[arg(short = 'c', long)]
    commands: Option<String>,

    /// Append engine events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("faena=debug")
    } else {
        tracing_subscriber::EnvFilter::new("faena=info")
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().without_time().compact())
        .init();

    let options = ExecuteOptions {
        dry_run: cli.dry_run,
        command_filter: cli.commands.map(|names| {
            names
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        }),
    };

    let mut sinks: Vec<Box<dyn EventSink>> = vec![Box::new(ConsoleSink::new())];
    if let Some(path) = cli.events {
        sinks.push(Box::new(JsonlSink::new(path)));
    }
    let mut sink = MultiSink::new(sinks);

    let mut shutdown = Shutdown::install();

    match execute_job(&cli.manifest, &options, &mut sink, &mut shutdown).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", format!("error: {error}").red());
            ExitCode::from(error.exit_code())
        }
    }
}
