//! Clap derive structures for the `sleepme` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sleepme -- control Sleep.me Dock Pro thermostats
#[derive(Debug, Parser)]
#[command(
    name = "sleepme",
    version,
    about = "Control Sleep.me Dock Pro thermostats from the command line",
    long_about = "Reads and controls Sleep.me Dock Pro devices through the Sleep.me\n\
        developer API. Every change is verified against the device before it\n\
        is reported as applied.",
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
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "SLEEPME_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, env = "SLEEPME_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Device ID (overrides profile)
    #[arg(long, short = 'd', env = "SLEEPME_DEVICE", global = true)]
    pub device: Option<String>,

    /// API token
    #[arg(long, env = "SLEEPME_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SLEEPME_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, env = "SLEEPME_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Wait before verifying a command (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub settle_delay: Option<Duration>,

    /// Wait between verification attempts (e.g. "2m 7s")
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub retry_delay: Option<Duration>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text (scripting)
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    /// Leave the preset and restore the previous set-point
    None,
    /// Cool as hard as possible
    MaxCool,
    /// Heat as hard as possible
    MaxHeat,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices claimed by the API token
    #[command(alias = "ls")]
    Devices,

    /// Show the current device state
    #[command(alias = "st")]
    Status,

    /// Set the target temperature in °C (rounded to 0.5)
    #[command(name = "set-temp", alias = "temp")]
    SetTemp(SetTempArgs),

    /// Turn thermal control on or off
    Power(ToggleArgs),

    /// Enable or disable the device schedule
    Schedule(ToggleArgs),

    /// Set the display brightness
    Brightness(BrightnessArgs),

    /// Apply a temperature preset
    Preset(PresetArgs),

    /// Stream device state until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetTempArgs {
    /// Target temperature in °C (12.5 to 46.5)
    #[arg(allow_negative_numbers = true)]
    pub celsius: f64,
}

#[derive(Debug, Args)]
pub struct ToggleArgs {
    #[arg(value_enum)]
    pub state: Toggle,
}

#[derive(Debug, Args)]
pub struct BrightnessArgs {
    /// Brightness in percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub percent: u8,
}

#[derive(Debug, Args)]
pub struct PresetArgs {
    #[arg(value_enum)]
    pub preset: PresetArg,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval (e.g. "30s"); defaults to the profile's setting
    #[arg(long, short = 'i', value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,
    /// Print the effective configuration (tokens redacted)
    Show,
    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
