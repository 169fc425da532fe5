//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// capture-sim - drive the dataset capture scheduler with simulated sensors
#[derive(Parser, Debug)]
#[command(
    name = "capture-sim",
    author,
    version,
    about = "Frame-driven dataset capture scheduler",
    long_about = "Runs the dataset capture scheduler against a synthetic host loop.\n\n\
                  Registers the sensors and definitions from configuration, simulates \n\
                  captures and delayed readbacks frame by frame, and routes finalized \n\
                  records to the configured endpoint and sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CAPTURE_SIM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CAPTURE_SIM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a capture session
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "capture.toml", env = "CAPTURE_SIM_CONFIG")]
    pub config: PathBuf,

    /// Host frames to simulate before shutting down
    #[arg(long, default_value = "600", env = "CAPTURE_SIM_FRAMES")]
    pub frames: u64,

    /// Start a new sequence every N frames (0 = single sequence)
    #[arg(long, default_value = "0", env = "CAPTURE_SIM_SEQUENCE_LENGTH")]
    pub sequence_length: u64,

    /// Frames an async annotation takes to read back
    #[arg(long, default_value = "2", env = "CAPTURE_SIM_READBACK_LATENCY")]
    pub readback_latency: u64,

    /// Upper bound on ticks spent draining at shutdown
    #[arg(long, default_value = "600", env = "CAPTURE_SIM_SHUTDOWN_TICKS")]
    pub shutdown_ticks: u64,

    /// Override the endpoint kind from configuration (dispatch, log, none)
    #[arg(long, env = "CAPTURE_SIM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Seed for simulated sensor data
    #[arg(long, env = "CAPTURE_SIM_SEED")]
    pub seed: Option<u64>,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Capacity of the endpoint-to-dispatcher channel
    #[arg(long, default_value = "1024", env = "CAPTURE_SIM_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CAPTURE_SIM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "capture.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed sensor information
    #[arg(long)]
    pub sensors: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "capture-sim",
            "run",
            "--config",
            "cfg.toml",
            "--frames",
            "10",
            "--sequence-length",
            "4",
            "--readback-latency",
            "3",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("cfg.toml"));
        assert_eq!(args.frames, 10);
        assert_eq!(args.sequence_length, 4);
        assert_eq!(args.readback_latency, 3);
        assert_eq!(args.shutdown_ticks, 600);
        assert!(args.endpoint.is_none());
    }
}
