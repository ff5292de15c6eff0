//! Adapter from [`Logger`] to the `tracing` crate.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Forwards processor log lines to `tracing` under the `geoharvest::processor`
/// target, so they reach whichever subscriber
/// [`init_logging`](crate::logging::init_logging) installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "geoharvest::processor", "{}", args),
            LogLevel::Debug => tracing::debug!(target: "geoharvest::processor", "{}", args),
            LogLevel::Info => tracing::info!(target: "geoharvest::processor", "{}", args),
            LogLevel::Warn => tracing::warn!(target: "geoharvest::processor", "{}", args),
            LogLevel::Error => tracing::error!(target: "geoharvest::processor", "{}", args),
        }
    }
}
