//! Logger that discards everything.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Discards all messages. Useful where processor output would be noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn log(&self, _level: LogLevel, _args: Arguments<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_logger_as_shared_trait_object() {
        let logger: Arc<dyn Logger> = Arc::new(NoOpLogger);
        crate::log_error!(logger, "dropped {}", 1);
        logger.info(format_args!("dropped"));
    }
}
