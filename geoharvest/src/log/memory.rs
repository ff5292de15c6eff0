//! Logger that records lines in memory.

use crate::log::{LogLevel, Logger};
use parking_lot::Mutex;
use std::fmt::Arguments;

/// Captures formatted lines as `"<LEVEL> <message>"`.
///
/// Used by tests to assert on what a processor reported, for example the
/// diagnostic logged when a constituent ends without a valid destination.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every captured line, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|(level, msg)| format!("{} {}", level, msg))
            .collect()
    }

    /// Returns true if any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, msg)| msg.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.lines.lock().push((level, args.to_string()));
    }
}
