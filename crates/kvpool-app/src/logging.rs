//! Logging and tracing setup for the kvpool binary
//!
//! Console output goes to stderr so command output on stdout stays
//! machine-readable. Supports:
//! - Pretty or JSON console output
//! - An optional daily-rotated JSON log file
//! - Environment-based filtering via RUST_LOG

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_FILTER: &str =
    "warn,kvpool=info,kvpool_app=info,kvpool_connection=info,kvpool_driver_redis=info";

/// Console log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colored output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console output format
    pub format: LogFormat,

    /// Directory for the rotated JSON log file
    pub log_dir: PathBuf,

    /// Whether to also write JSON logs to `log_dir`
    pub enable_file_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close events
    pub enable_spans: bool,

    /// Filter used when RUST_LOG is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            log_dir: log_directory(),
            enable_file_logs: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Override the console format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize the global subscriber
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the lifetime of the process.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG takes precedence over the configured filter
    let build_filter = || {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.default_filter))
    };

    // NEW fires once per span; ENTER would repeat on every async re-poll
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .pretty()
            .with_filter(build_filter()?)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_filter(build_filter()?)
            .boxed(),
    };
    layers.push(console_layer);

    let mut guard = None;
    if config.enable_file_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "kvpool.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(build_filter()?)
            .boxed();

        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        format = ?config.format,
        file_logs = config.enable_file_logs,
        log_dir = %config.log_dir.display(),
        "logging initialized"
    );

    Ok(guard)
}

/// Default directory for rotated log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kvpool")
        .join("logs")
}
