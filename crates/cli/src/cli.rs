//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use contracts::{ChannelKind, SinkMode};

/// Motion Streamer - stream motion-sensor samples to a file or a TCP server
#[derive(Parser, Debug)]
#[command(
    name = "motion-streamer",
    author,
    version,
    about = "Stream motion-sensor samples to a local file or a remote TCP server",
    long_about = "Streams timestamped motion-sensor samples to a local file or to a remote \n\
                  server over plain TCP, one CSV line per sample. Network delivery \n\
                  reconnects with exponential backoff up to a retry ceiling."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MOTION_STREAMER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MOTION_STREAMER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default level used when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect samples and deliver them to the configured sink
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "MOTION_STREAMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output mode override
    #[arg(long, value_enum, env = "MOTION_STREAMER_MODE")]
    pub mode: Option<ModeArg>,

    /// Override server host
    #[arg(long, env = "MOTION_STREAMER_HOST")]
    pub host: Option<String>,

    /// Override server port
    #[arg(long, env = "MOTION_STREAMER_PORT")]
    pub port: Option<u16>,

    /// Override output file path
    #[arg(short, long, env = "MOTION_STREAMER_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Override sample channel layout
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Override sample rate (Hz)
    #[arg(long)]
    pub rate: Option<f64>,

    /// Stop after producing this many samples (0 = unlimited)
    #[arg(long, default_value = "0", env = "MOTION_STREAMER_MAX_SAMPLES")]
    pub max_samples: u64,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "MOTION_STREAMER_DURATION")]
    pub duration: u64,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "MOTION_STREAMER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without streaming
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "motion-streamer.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "motion-streamer.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Output mode
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    File,
    Network,
}

impl From<ModeArg> for SinkMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::File => Self::File,
            ModeArg::Network => Self::Network,
        }
    }
}

/// Sample channel layout
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Acceleration,
    AccelerationGyro,
    Quaternion,
}

impl From<KindArg> for ChannelKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Acceleration => Self::Acceleration,
            KindArg::AccelerationGyro => Self::AccelerationGyro,
            KindArg::Quaternion => Self::Quaternion,
        }
    }
}
