//! Clap derive structures for the `maintlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only clap and clap_complete may be used here; build.rs includes this
//! file directly to render man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// maintlink -- maintenance console for reverse vending machine boards
#[derive(Debug, Parser)]
#[command(
    name = "maintlink",
    version,
    about = "Drive RVM controller boards from the command line",
    long_about = "Operator console for the sensor, motor, and system boards of a\n\
        reverse vending machine. Commands are queued per board, retried on\n\
        failure, and never overlap; health probes and background polling\n\
        only run while the machine is in maintenance mode.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MAINTLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Board service base URL (overrides config)
    #[arg(long, short = 'u', env = "MAINTLINK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MAINTLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, env = "MAINTLINK_COLOR", default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in milliseconds (overrides config)
    #[arg(long, env = "MAINTLINK_TIMEOUT_MS", global = true)]
    pub timeout_ms: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one event per line in `watch`)
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// A board command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    Sensor,
    Motor,
    System,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the console and print every event until Ctrl-C
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Queue one command on a board and wait for it to settle
    #[command(alias = "s")]
    Send(SendArgs),

    /// Run a single health probe cycle
    Probe,

    /// Run the continuous weight measurement for a while
    Measure(MeasureArgs),

    /// Read or switch maintenance mode
    Mode(ModeArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Do not subscribe to the board event feed
    #[arg(long)]
    pub no_stream: bool,

    /// Do not register the background pollers
    #[arg(long)]
    pub no_pollers: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub seconds: Option<u64>,
}

// ── Send ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target board
    pub channel: ChannelArg,

    /// Command name, e.g. "konveyor-ileri" or "agirlik-olc"
    pub command: String,

    /// JSON request body
    #[arg(long, short = 'd')]
    pub payload: Option<String>,

    /// Queue ahead of pending commands
    #[arg(long)]
    pub high: bool,

    /// Skip the maintenance mode check
    #[arg(long, short = 'f')]
    pub force: bool,
}

// ── Measure ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MeasureArgs {
    /// How long to measure
    #[arg(long, short = 's', default_value = "10")]
    pub seconds: u64,

    /// Measurement interval in milliseconds (overrides config)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

// ── Mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ModeArgs {
    #[command(subcommand)]
    pub command: Option<ModeCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ModeCommand {
    /// Show the machine state (default)
    Get,
    /// Enter maintenance mode
    On,
    /// Leave maintenance mode
    Off,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file (interactive unless --defaults)
    Init {
        /// Write defaults without prompting
        #[arg(long)]
        defaults: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
