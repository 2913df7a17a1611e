mod config;
mod flatten;
mod telemetry;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig};
use pipeline::errors::PipelineError;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry::TelemetryError;

#[derive(Parser)]
#[command(name = "publisher", about = "Usage telemetry event publisher")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Consume events and publish flattened records
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Flatten newline-delimited events from a file or stdin
    Flatten {
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum PublisherError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Run { config } => run(&config),
        CliCommand::Flatten { input } => flatten(input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "publisher failed");
            eprintln!("publisher: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &std::path::Path) -> Result<(), PublisherError> {
    let config = Config::from_file(path)?;
    let _sentry = telemetry::init_logging(&config.common.logging)?;
    if let Some(metrics) = &config.common.metrics {
        telemetry::init_metrics(metrics)?;
    }

    tracing::info!(config = %path.display(), "starting publisher");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(pipeline::run(config.pipeline))?;
    tracing::info!("publisher stopped");
    Ok(())
}

fn flatten(input: Option<PathBuf>) -> Result<(), PublisherError> {
    let _sentry = telemetry::init_logging(&LoggingConfig::default())?;

    let text = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let output = flatten::flatten_ndjson(&text);
    let mut stdout = io::stdout().lock();
    if !output.is_empty() {
        writeln!(stdout, "{output}")?;
    }
    stdout.flush()?;
    Ok(())
}
