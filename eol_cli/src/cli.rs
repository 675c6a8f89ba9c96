//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "eol", version, about = "End-of-line test rig")]
pub struct Cli {
    /// Path to the rig TOML (hardware, logging, profile directory)
    #[arg(long, value_name = "FILE", default_value = "etc/eol_config.toml")]
    pub config: PathBuf,

    /// Print results and logs as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one EOL test and print its result
    Run {
        /// Profile name, loaded from `<profiles.dir>/<NAME>.toml`
        #[arg(long, value_name = "NAME", default_value = "default")]
        profile: String,
        /// Device-under-test identifier (falls back to the profile's `dut`)
        #[arg(long, value_name = "ID", default_value = "")]
        dut: String,
        /// Operator identifier (falls back to the profile's `operator_id`)
        #[arg(long, value_name = "ID", default_value = "")]
        operator: String,
    },
    /// Connect every device, report, then disconnect
    SelfCheck,
    /// Print the engine status map
    Health,
    /// Stop the robot and cut DUT power
    Estop {
        /// Robot axis to stop
        #[arg(long, default_value_t = 0)]
        axis: u8,
    },
}
