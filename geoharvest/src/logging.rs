//! Logging infrastructure for the daemon and CLI.
//!
//! Provides structured logging with file output and console output:
//! - Appends to the configured log file (`~/.geoharvest/geoharvest.log` by default)
//! - Mirrors events to stderr so stdout stays free for command output
//! - Configurable via RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging system.
///
/// Creates the log directory if needed and sets up dual output to the log
/// file and stderr. Without RUST_LOG the level is `info`, or `debug` for
/// this crate when `debug` is set.
///
/// # Errors
///
/// Returns error if the log directory cannot be created, or if a global
/// subscriber is already installed.
pub fn init_logging(log_dir: &Path, log_file: &str, debug: bool) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialize logging for a full log file path.
pub fn init_logging_at(path: &Path, debug: bool) -> Result<LoggingGuard, io::Error> {
    let (dir, file) = split_log_path(path)?;
    init_logging(&dir, &file, debug)
}

/// Filter used when RUST_LOG is not set.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "info,geoharvest=debug"
    } else {
        "info"
    }
}

/// Splits a log file path into its directory and file name.
pub fn split_log_path(path: &Path) -> Result<(PathBuf, String), io::Error> {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log path '{}' has no file name", path.display()),
            )
        })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file))
}
