//! Command-line argument parsing.

use clap::Parser;

/// abiquo-watch - Wait for Abiquo asynchronous tasks to finish
#[derive(Parser, Debug)]
#[command(name = "abiquo-watch")]
#[command(about = "Wait for Abiquo asynchronous tasks and report how each one ended")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Base URL of the Abiquo API
    #[arg(long)]
    pub endpoint: Option<String>,

    /// API user
    #[arg(short, long)]
    pub user: Option<String>,

    /// API password
    #[arg(long, env = "ABIQUO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Delay between two polls, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Give up on unfinished tasks after this many seconds
    #[arg(long)]
    pub max_wait_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Task links to watch, absolute or relative to the endpoint
    #[arg(required = true)]
    pub tasks: Vec<String>,
}
