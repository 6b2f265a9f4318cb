//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// kvpool - pooled connections to a Redis-compatible key-value service
#[derive(Parser, Debug)]
#[command(name = "kvpool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML config file (default: <config dir>/kvpool/kvpool.toml)
    #[arg(long, global = true, env = "KVPOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Endpoint URL, overriding the config file (redis://[user:pass@]host[:port][/db])
    #[arg(short, long, global = true, env = "KVPOOL_URL")]
    pub url: Option<String>,

    /// Console log format, overriding the config file
    #[arg(long, global = true, value_enum, env = "KVPOOL_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Acquire a connection, PING the server and report latency
    Ping,

    /// Warm the pool and print its statistics as JSON
    Stats,

    /// Run PINGs through the pool with several concurrent tasks
    Bench {
        /// Total number of requests
        #[arg(short = 'n', long, default_value = "1000")]
        requests: usize,

        /// Number of concurrent tasks
        #[arg(short, long, default_value = "16", value_parser = clap::value_parser!(u16).range(1..))]
        concurrency: u16,
    },

    /// Keep a warm pool open and log its statistics until Ctrl+C
    Serve {
        /// Seconds between statistics reports
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
    },
}
