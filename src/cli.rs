// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cmdq`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cmdq",
    version,
    about = "Run external commands concurrently under a parallelism cap.",
    long_about = None
)]
pub struct CliArgs {
    /// Commands to run. Each argument is one command, split on whitespace
    /// (quoting and escaping are not interpreted).
    #[arg(required = true, value_name = "CMD")]
    pub commands: Vec<String>,

    /// Maximum number of concurrently running commands (0 = unbounded).
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_parallel: usize,

    /// Delay before each command starts (e.g. 250ms, 3s, 1m).
    #[arg(long, value_name = "DURATION")]
    pub delay: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CMDQ_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse a simple duration string like `"250ms"`, `"3s"`, `"1m"`, `"2h"`.
pub fn parse_delay(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
