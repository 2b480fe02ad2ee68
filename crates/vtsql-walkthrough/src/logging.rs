//! Logging and tracing setup for the walkthrough
//!
//! Console output is always on. A JSON log with daily rotation is added when
//! a log directory is configured, which is what gets attached to bug reports.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Directory for JSON log files; `default` picks the platform data dir
pub const ENV_LOG_DIR: &str = "VTSQL_LOG_DIR";

const LOG_FILE_PREFIX: &str = "vtsql-walkthrough.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Where JSON log files go; `None` disables file output
    pub log_dir: Option<PathBuf>,

    /// Whether to include file/line information in console output
    pub include_location: bool,

    /// Whether to log span open/close (for timing)
    pub enable_spans: bool,

    /// Filter used when RUST_LOG is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "warn,vtsql_walkthrough=info,vtsql_session=info,vtsql_driver_mysql=info,vtsql_core=info"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose console output with span timings
    pub fn development() -> Self {
        Self {
            enable_spans: true,
            default_filter: "info,vtsql_walkthrough=debug,vtsql_session=debug,vtsql_driver_mysql=debug"
                .to_string(),
            ..Self::default()
        }
    }

    /// Apply `VTSQL_LOG_DIR` from `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.log_dir = match lookup(ENV_LOG_DIR) {
            Some(raw) if raw.trim().eq_ignore_ascii_case("default") => Some(log_directory()),
            Some(raw) if !raw.trim().is_empty() => Some(PathBuf::from(raw.trim())),
            _ => self.log_dir,
        };
        self
    }
}

/// Initialize the logging system
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the program ends.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG takes precedence over the configured default
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_ansi(true)
        .pretty()
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = ?config.log_dir.as_ref().map(|d| d.display().to_string()),
        "logging initialized"
    );
    Ok(guard)
}

/// Platform default for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vtsql")
        .join("logs")
}
