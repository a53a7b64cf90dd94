//! CLI command handlers and utilities.

mod commands;
mod logging;

pub use commands::{run_command, Cli, Commands};
pub use logging::LogLevel;
