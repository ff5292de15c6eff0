//! Logger that tags every line with the unit of work it belongs to.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;
use std::sync::Arc;

/// Prefixes messages with `[scope]` before forwarding them.
///
/// Request processors scope their logger to the request id; constituent
/// processors nest a second scope for the constituent key.
#[derive(Clone)]
pub struct ScopedLogger {
    inner: Arc<dyn Logger>,
    scope: String,
}

impl ScopedLogger {
    pub fn new(inner: Arc<dyn Logger>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    /// Returns a logger whose scope is `outer/inner`.
    pub fn nested(&self, scope: impl AsRef<str>) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scope: format!("{}/{}", self.scope, scope.as_ref()),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Logger for ScopedLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.inner
            .log(level, format_args!("[{}] {}", self.scope, args));
    }
}

impl std::fmt::Debug for ScopedLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedLogger")
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLogger;

    #[test]
    fn test_nested_scope_prefix() {
        let sink = Arc::new(MemoryLogger::new());
        let request = ScopedLogger::new(sink.clone(), "request-4");
        let constituent = request.nested("a.tif");

        constituent.info(format_args!("started"));

        assert_eq!(constituent.scope(), "request-4/a.tif");
        assert_eq!(sink.lines(), vec!["INFO [request-4/a.tif] started"]);
    }
}
