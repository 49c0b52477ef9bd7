//! Logging infrastructure for delve
//!
//! Logs always go to `~/.local/state/delve/delve.log` (XDG state dir), so the
//! chat transcript on stdout stays clean. Long-running commands such as the
//! proxy can mirror logs to stderr as well.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Where log lines are written besides the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Log file only
    #[default]
    File,
    /// Log file plus a compact stderr stream
    FileAndStderr,
}

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File output to the XDG state directory, rotated daily, keeping at most
///   `max_files` files
/// - Optional stderr mirror (see [`Output`])
/// - Level from `RUST_LOG`, falling back to `config.level`
pub fn init(config: &LoggingConfig, output: Output) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("delve.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {}", e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = (output == Output::FileAndStderr).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    // try_init: a second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        ?output,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive; pending lines are flushed on drop
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the log file path
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
