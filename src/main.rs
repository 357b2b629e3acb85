//! numbatch CLI
//!
//! Reads integers from stdin and prints the positive multiples of three in
//! size- and time-bounded groups.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use numbatch::{build_runtime, run_pipeline, Config};

#[derive(Parser)]
#[command(name = "numbatch")]
#[command(about = "Filter integers from stdin and emit them in batches", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override buffer capacity
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Override flush interval in milliseconds
    #[arg(long, global = true)]
    flush_interval_ms: Option<u64>,

    /// Override output label
    #[arg(long, global = true)]
    label: Option<String>,

    /// Enable periodic metrics and the final summary
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default if no command specified)
    Run,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "numbatch.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries pipeline output only
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(&cli)?;
            run_command(config)?;
        }

        Some(Commands::Validate) => {
            let config = load_config(&cli)?;
            config.validate()?;
            println!("Configuration is valid");
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

/// Load the configuration file, if any, and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(capacity) = cli.capacity {
        config.buffer.capacity = capacity;
    }
    if let Some(interval) = cli.flush_interval_ms {
        config.buffer.flush_interval_ms = interval;
    }
    if let Some(label) = &cli.label {
        config.output.label = label.clone();
    }
    if cli.metrics {
        config.processing.enable_metrics = true;
    }

    Ok(config)
}

/// Run the pipeline; `run_pipeline` validates the configuration.
fn run_command(config: Config) -> Result<()> {
    let shutdown_timeout = Duration::from_millis(config.processing.shutdown_timeout_ms);
    let runtime = build_runtime(config.processing.worker_threads)?;
    let result = runtime.block_on(async { run_pipeline(config).await });

    // A stdin read may still be parked on a blocking thread
    runtime.shutdown_timeout(shutdown_timeout);

    result.map(|_| ())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    let yaml = r#"# numbatch configuration

# === INPUT: stdin lines ===
input:
  # Line that ends the input
  quit_sentinel: "q"

  # Printed before reading (null disables it)
  prompt: "Enter integers (type 'q' to quit):"

  # Printed to stderr for lines that are not integers
  invalid_input_message: "Invalid input. Please enter an integer."

# === BUFFER: grouping of surviving values ===
buffer:
  # Flush as soon as this many values are buffered
  capacity: 5

  # Flush whatever is buffered after this long without a flush
  flush_interval_ms: 2000

# === OUTPUT ===
output:
  # Every value is printed as "<label>: <value>"
  label: "Received"

# === PROCESSING ===
processing:
  # Tokio worker threads (null = num CPUs)
  # worker_threads: 2

  # Log counters periodically and print a summary at exit
  enable_metrics: false
  metrics_interval_secs: 10

  # Optional path to save metrics JSON after run completes
  # metrics_output_path: "numbatch-metrics.json"

  # Grace period for blocked stdin reads at exit
  shutdown_timeout_ms: 100
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["numbatch"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "numbatch",
            "--capacity",
            "3",
            "--flush-interval-ms",
            "250",
            "--label",
            "batch",
            "--metrics",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.buffer.capacity, 3);
        assert_eq!(config.buffer.flush_interval_ms, 250);
        assert_eq!(config.output.label, "batch");
        assert!(config.processing.enable_metrics);
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["numbatch", "validate", "-c", "test.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_run_command_rejects_invalid_config() {
        let mut config = Config::default();
        config.buffer.flush_interval_ms = 0;

        assert!(run_command(config).is_err());
    }

    #[test]
    fn test_generated_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("numbatch.yaml");

        generate_config_command(path.clone()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.capacity, 5);
        assert_eq!(config.output.label, "Received");
    }
}
