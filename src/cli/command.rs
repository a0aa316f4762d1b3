use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    about        = "Tools for resynchronizing and inspecting compressed audio elementary streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print stream information
    Info(InfoArgs),

    /// Write the resynchronized frames of a stream to a file.
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Input stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Container of the input.
    #[arg(long, value_enum, default_value_t = InputFormat::Es)]
    pub input_format: InputFormat,

    /// Only read PES packets with this stream id (e.g. 0xC0).
    #[arg(long, value_name = "ID", value_parser = parse_stream_id)]
    pub stream_id: Option<u8>,

    /// Keep PES payloads that arrive before the first timestamp.
    #[arg(long)]
    pub no_require_pts: bool,

    /// Do not probe for LATM framed AAC.
    #[arg(long)]
    pub no_latm: bool,

    /// Frame buffer size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = esframe::process::DEFAULT_CAPACITY)]
    pub capacity: usize,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Print one line per frame.
    #[arg(long)]
    pub list_frames: bool,

    /// Write a YAML summary to this path.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Output path for the frames (use "-" for stdout).
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Re-check every frame header before writing and resynchronize on
    /// mismatches.
    #[arg(long)]
    pub verify: bool,

    /// Disable progress estimation
    #[arg(long)]
    pub no_estimate_progress: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum InputFormat {
    /// Raw elementary stream.
    Es,
    /// Back-to-back PES packets.
    Pes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

impl Cli {
    /// Level at which recoverable stream errors become fatal.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

fn parse_stream_id(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid stream id {value:?}: {e}"))
}

#[test]
fn stream_id_accepts_hex_and_decimal() {
    assert_eq!(parse_stream_id("0xC0"), Ok(0xC0));
    assert_eq!(parse_stream_id("189"), Ok(0xBD));
    assert!(parse_stream_id("0x1C0").is_err());
}

#[test]
fn cli_parses_extract_arguments() {
    let cli = Cli::parse_from([
        "esframed",
        "--strict",
        "extract",
        "in.pes",
        "--input-format",
        "pes",
        "--no-latm",
        "--no-require-pts",
        "--stream-id",
        "0xBD",
        "--output-path",
        "out.ac3",
    ]);

    assert_eq!(cli.fail_level(), log::Level::Warn);
    let Commands::Extract(args) = cli.command else {
        panic!("expected extract command");
    };
    assert_eq!(args.stream.input_format, InputFormat::Pes);
    assert!(args.stream.no_latm);
    assert!(args.stream.no_require_pts);
    assert_eq!(args.stream.stream_id, Some(0xBD));
    assert_eq!(args.stream.capacity, esframe::process::DEFAULT_CAPACITY);
}
