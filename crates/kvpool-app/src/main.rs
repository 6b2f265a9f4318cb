//! kvpool - command line front end for the connection pool
//!
//! Usage:
//!   kvpool ping --url redis://127.0.0.1:6379
//!   kvpool stats --config /etc/kvpool/kvpool.toml
//!   kvpool bench --requests 10000 --concurrency 32
//!   kvpool serve --interval-secs 30 --log-format json

mod cli;
mod commands;
mod config;
mod logging;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.url.as_deref() {
        config.apply_url(url)?;
    }

    let mut logging_config = config.logging.clone();
    if let Some(format) = cli.log_format {
        logging_config = logging_config.with_format(format);
    }
    // Keep the file writer alive until exit
    let _log_guard = match logging::init(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        }
    };

    let pool = commands::build_pool(&config).await?;

    let outcome = match cli.command {
        Command::Ping => commands::ping(&pool).await.map(|report| {
            println!(
                "PONG from {} in {:.2?} ({})",
                pool.config().endpoint(),
                report.latency,
                report.health
            );
        }),
        Command::Stats => serde_json::to_string_pretty(&commands::stats(&pool))
            .context("Failed to serialize pool statistics")
            .map(|json| println!("{}", json)),
        Command::Bench {
            requests,
            concurrency,
        } => {
            let report = commands::bench(&pool, requests, usize::from(concurrency)).await;
            println!(
                "{} requests in {:.2?} ({:.0} req/s), {} errors",
                report.requests,
                report.elapsed,
                report.throughput(),
                report.errors
            );
            serde_json::to_string_pretty(&report.stats)
                .context("Failed to serialize pool statistics")
                .map(|json| println!("{}", json))
        }
        Command::Serve { interval_secs } => {
            commands::serve(
                &pool,
                Duration::from_secs(interval_secs),
                commands::shutdown_signal(),
            )
            .await;
            Ok(())
        }
    };

    pool.close().await;
    outcome
}
